//! `/api/auth`: registration, login and profile management.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::validate::{self, Checks};
use crate::api::{ApiError, ApiResponse, AuthUser, FieldError};
use crate::auth::{hash_password, verify_password};
use crate::db::{DbError, NewUser, PublicProfile, User, UserChanges};
use crate::server::AppState;

/// Token plus the profile it was issued for.
#[derive(Debug, Serialize)]
pub struct Session {
    token: String,
    user: PublicProfile,
}

/// A profile wrapped for responses.
#[derive(Debug, Serialize)]
pub struct ProfileData {
    user: PublicProfile,
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/register`
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::new();
    let username = checks.check(validate::username(&body.username));
    let email = checks.check(validate::email(&body.email));
    let password = checks.check(validate::password("password", &body.password));
    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(ApiError::validation(checks.into_errors()));
    };

    let user = {
        let username = username.clone();
        let email = email.clone();
        state
            .db(move |repo| {
                if repo.get_user_by_email(&email)?.is_some() {
                    return Ok(Err("email"));
                }
                if repo.get_user_by_username(&username)?.is_some() {
                    return Ok(Err("username"));
                }
                let hash = hash_password(&password).map_err(|e| DbError::new(e.message))?;
                repo.create_user(NewUser::new(username, email, hash)).map(Ok)
            })
            .await?
    };
    let user = user.map_err(|field| {
        warn!(field, "Registration conflict");
        ApiError::bad_request(format!("User with this {} already exists", field))
    })?;

    let token = state.credentials.issue_token(*user.id())?;
    info!(user_id = user.id(), %username, "Account registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "User registered successfully",
            Session {
                token,
                user: user.to_public_profile(),
            },
        )),
    ))
}

/// Body of `POST /api/auth/login`. `login` is a username or an email.
#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    login: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/login`
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<ApiResponse<Session>>, ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::new();
    let login = body.login.trim().to_string();
    if login.is_empty() {
        checks.push(FieldError::new("login", "Username or email is required"));
    }
    if body.password.is_empty() {
        checks.push(FieldError::new("password", "Password is required"));
    }
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let found = state.db(move |repo| repo.get_user_by_login(&login)).await?;
    let Some(user) = found else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    if !*user.is_active() {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }
    if !password_matches(body.password, user.password_hash().clone()).await? {
        warn!(user_id = user.id(), "Wrong password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let user_id = *user.id();
    state.db(move |repo| repo.touch_login(user_id)).await?;
    let refreshed = state.db(move |repo| repo.get_user(user_id)).await?;
    let user = refreshed.unwrap_or(user);

    let token = state.credentials.issue_token(user_id)?;
    info!(user_id, "Login successful");
    Ok(Json(ApiResponse::with_message(
        "Login successful",
        Session {
            token,
            user: user.to_public_profile(),
        },
    )))
}

/// `GET /api/auth/profile`
pub async fn profile(AuthUser(user): AuthUser) -> Json<ApiResponse<ProfileData>> {
    Json(ApiResponse::ok(ProfileData {
        user: user.to_public_profile(),
    }))
}

/// Body of `PUT /api/auth/profile`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileBody {
    username: Option<String>,
    email: Option<String>,
    bio: Option<String>,
    avatar: Option<String>,
}

impl ProfileBody {
    fn changes(&self) -> Result<UserChanges, ApiError> {
        let mut checks = Checks::new();
        let changes = UserChanges {
            username: self
                .username
                .as_deref()
                .and_then(|u| checks.check(validate::username(u))),
            email: self
                .email
                .as_deref()
                .and_then(|e| checks.check(validate::email(e))),
            bio: self.bio.as_deref().and_then(|b| checks.check(validate::bio(b))),
            avatar: self
                .avatar
                .as_deref()
                .and_then(|a| checks.check(validate::avatar(a))),
        };
        let errors = checks.into_errors();
        if errors.is_empty() {
            Ok(changes)
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

fn taken_by_other(existing: Option<User>, user_id: i32) -> bool {
    existing.is_some_and(|other| *other.id() != user_id)
}

/// `PUT /api/auth/profile`
#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ProfileBody>, JsonRejection>,
) -> Result<Json<ApiResponse<ProfileData>>, ApiError> {
    let Json(body) = payload?;
    let changes = body.changes()?;
    let user_id = *user.id();

    let updated = state
        .db(move |repo| {
            if let Some(username) = &changes.username {
                if taken_by_other(repo.get_user_by_username(username)?, user_id) {
                    return Ok(Err("Username"));
                }
            }
            if let Some(email) = &changes.email {
                if taken_by_other(repo.get_user_by_email(email)?, user_id) {
                    return Ok(Err("Email"));
                }
            }
            repo.update_profile(user_id, changes).map(Ok)
        })
        .await?
        .map_err(|field| ApiError::bad_request(format!("{} is already taken", field)))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!(user_id, "Profile updated");

    Ok(Json(ApiResponse::with_message(
        "Profile updated successfully",
        ProfileData {
            user: updated.to_public_profile(),
        },
    )))
}

/// Body of `PUT /api/auth/change-password`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

/// `PUT /api/auth/change-password`
#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::new();
    if body.current_password.is_empty() {
        checks.push(FieldError::new("currentPassword", "Current password is required"));
    }
    let new_password = checks.check(validate::password("newPassword", &body.new_password));
    let Some(new_password) = new_password.filter(|_| !body.current_password.is_empty()) else {
        return Err(ApiError::validation(checks.into_errors()));
    };

    if !password_matches(body.current_password, user.password_hash().clone()).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let user_id = *user.id();
    state
        .db(move |repo| {
            let hash = hash_password(&new_password).map_err(|e| DbError::new(e.message))?;
            repo.set_password_hash(user_id, hash)
        })
        .await?;
    info!(user_id, "Password changed");
    Ok(Json(ApiResponse::message("Password changed successfully")))
}

/// Runs the bcrypt check on the blocking pool.
async fn password_matches(password: String, stored: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))
}
