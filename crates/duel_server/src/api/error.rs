//! REST error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::Display;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::db::DbError;

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Request field name.
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Error returned by a REST handler.
#[derive(Debug, Display)]
pub enum ApiError {
    /// 400 with an optional list of field errors.
    #[display("{message}")]
    BadRequest {
        /// Summary.
        message: String,
        /// Per-field failures.
        errors: Vec<FieldError>,
    },
    /// 401.
    #[display("{_0}")]
    Unauthorized(String),
    /// 404.
    #[display("{_0}")]
    NotFound(String),
    /// 500. The detail is logged, never sent.
    #[display("{_0}")]
    Internal(String),
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// 400 with a single message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// 400 "Validation failed" carrying every field error.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::BadRequest {
            message: "Validation failed".to_string(),
            errors,
        }
    }

    /// 401.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// 404.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest { message, errors } if !errors.is_empty() => {
                warn!(%message, count = errors.len(), "Request failed validation");
                json!({ "success": false, "message": message, "errors": errors })
            }
            Self::Internal(detail) => {
                error!(%detail, "Request failed");
                json!({ "success": false, "message": "Internal server error" })
            }
            other => json!({ "success": false, "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}
