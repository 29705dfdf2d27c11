//! Request field checks.
//!
//! Each check returns the normalized value or a [`FieldError`]; handlers
//! collect every failure before rejecting.

use crate::api::FieldError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
const PASSWORD_MIN: usize = 6;
const BIO_MAX: usize = 200;
const PLAYER_NAME_MAX: usize = 50;

/// Collects field errors across several checks.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    /// Starts an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the value on success, records the error otherwise.
    pub fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Records an error directly.
    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// The recorded errors, empty if every check passed.
    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }
}

/// 3 to 30 characters of letters, digits, `_` or `-`.
pub fn username(raw: &str) -> Result<String, FieldError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(FieldError::new(
            "username",
            "Username must be between 3 and 30 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(FieldError::new(
            "username",
            "Username can only contain letters, numbers, underscores and hyphens",
        ));
    }
    Ok(name.to_string())
}

/// A plausible address, lower-cased.
pub fn email(raw: &str) -> Result<String, FieldError> {
    let address = raw.trim().to_lowercase();
    let invalid = || FieldError::new("email", "Please enter a valid email address");

    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !address.chars().any(char::is_whitespace);
    if well_formed { Ok(address) } else { Err(invalid()) }
}

/// At least six characters with a lower-case letter, an upper-case letter and a digit.
pub fn password(field: &'static str, raw: &str) -> Result<String, FieldError> {
    let prefix = if field == "newPassword" { "New password" } else { "Password" };
    if raw.chars().count() < PASSWORD_MIN {
        return Err(FieldError::new(
            field,
            format!("{} must be at least 6 characters long", prefix),
        ));
    }
    let mixed = raw.chars().any(|c| c.is_ascii_lowercase())
        && raw.chars().any(|c| c.is_ascii_uppercase())
        && raw.chars().any(|c| c.is_ascii_digit());
    if !mixed {
        return Err(FieldError::new(
            field,
            format!(
                "{} must contain at least one lowercase letter, one uppercase letter, \
                 and one number",
                prefix
            ),
        ));
    }
    Ok(raw.to_string())
}

/// Up to 200 characters.
pub fn bio(raw: &str) -> Result<String, FieldError> {
    if raw.chars().count() > BIO_MAX {
        return Err(FieldError::new("bio", "Bio cannot exceed 200 characters"));
    }
    Ok(raw.to_string())
}

/// Blank clears the avatar; anything else must be an http(s) URL.
pub fn avatar(raw: &str) -> Result<Option<String>, FieldError> {
    let url = raw.trim();
    if url.is_empty() {
        return Ok(None);
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() => Ok(Some(url.to_string())),
        _ => Err(FieldError::new("avatar", "Avatar must be a valid URL")),
    }
}

/// A required, trimmed, non-empty player name of at most 50 characters.
pub fn player_name(
    field: &'static str,
    label: &str,
    raw: Option<&str>,
) -> Result<String, FieldError> {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(FieldError::new(field, format!("{} name is required", label)));
    }
    if name.chars().count() > PLAYER_NAME_MAX {
        return Err(FieldError::new(
            field,
            format!("{} name must be less than 50 characters", label),
        ));
    }
    Ok(name.to_string())
}

/// Two player names must differ, ignoring case.
pub fn distinct_names(first: &str, second: &str) -> Result<(), FieldError> {
    if first.to_lowercase() == second.to_lowercase() {
        return Err(FieldError::new("player2Name", "Player names must be different"));
    }
    Ok(())
}

/// An optional non-negative counter. Absent is zero.
pub fn counter(field: &'static str, label: &str, raw: Option<i64>) -> Result<i32, FieldError> {
    match raw {
        None => Ok(0),
        Some(value) => i32::try_from(value)
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| {
                FieldError::new(field, format!("{} must be a non-negative integer", label))
            }),
    }
}

/// Clamps an override counter into `0..=i32::MAX`.
pub fn clamp_counter(raw: i64) -> i32 {
    raw.clamp(0, i64::from(i32::MAX)) as i32
}
