//! Password hashing and bearer tokens.

use chrono::{Duration, Utc};
use derive_more::{Display, Error};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// bcrypt work factor for stored passwords.
pub const PASSWORD_COST: u32 = 12;

/// Credential error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Auth error: {} at {}:{}", message, file, line)]
pub struct AuthError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
    expired: bool,
}

impl AuthError {
    /// Creates a new credential error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
            expired: false,
        }
    }

    /// A token that was valid but has passed its expiry.
    #[track_caller]
    pub fn expired() -> Self {
        Self {
            expired: true,
            ..Self::new("Token has expired")
        }
    }

    /// Whether the rejected token had expired.
    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

/// JWT claims. `sub` is the account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: i32,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Issues and verifies HS256 tokens and hashes passwords.
#[derive(Clone)]
pub struct Credentials {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Creates credentials from a shared secret and token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the secret is empty.
    pub fn new(secret: &str, ttl_hours: i64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::new("JWT secret must not be empty"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours.max(1)),
        })
    }

    /// Issues a token for an account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if encoding fails.
    #[instrument(skip(self))]
    pub fn issue_token(&self, user_id: i32) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::new(format!("Failed to issue token: {}", e)))
    }

    /// Verifies a token and returns the account id it carries.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the token is malformed, forged or expired.
    #[instrument(skip_all)]
    pub fn verify_token(&self, token: &str) -> Result<i32, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            debug!(error = %e, "Token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::expired(),
                _ => AuthError::new(format!("Invalid token: {}", e)),
            }
        })?;
        Ok(data.claims.sub)
    }

    /// Resolves an optional token to an account id. Missing or invalid
    /// tokens degrade to a guest (`None`).
    pub fn account_from(&self, token: Option<&str>) -> Option<i32> {
        let token = token.map(str::trim).filter(|t| !t.is_empty())?;
        match self.verify_token(token) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid auth token, continuing as guest");
                None
            }
        }
    }
}

/// Hashes a password with bcrypt at [`PASSWORD_COST`]. CPU-bound; call it
/// off the async executor.
///
/// # Errors
///
/// Returns [`AuthError`] if bcrypt rejects the input.
#[instrument(skip_all)]
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, PASSWORD_COST)
        .map_err(|e| AuthError::new(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored bcrypt hash. Malformed hashes never
/// verify. CPU-bound; call it off the async executor.
#[instrument(skip_all)]
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "Malformed password hash");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("Secret123").unwrap();
        assert!(stored.starts_with("$2b$12$"));
        assert!(verify_password("Secret123", &stored));
        assert!(!verify_password("secret123", &stored));
    }

    #[test]
    fn test_same_password_gets_different_salt() {
        let first = hash_password("Secret123").unwrap();
        let second = hash_password("Secret123").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("Secret123", &second));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "$2b$12$tooshort"));
        assert!(!verify_password("x", "sha256$10000$salt$digest"));
    }

    #[test]
    fn test_token_carries_account_id() {
        let creds = Credentials::new("test-secret", 24).unwrap();
        let token = creds.issue_token(42).unwrap();
        assert_eq!(creds.verify_token(&token).unwrap(), 42);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issuer = Credentials::new("one", 24).unwrap();
        let verifier = Credentials::new("two", 24).unwrap();
        let token = issuer.issue_token(7).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_bad_token_degrades_to_guest() {
        let creds = Credentials::new("test-secret", 24).unwrap();
        assert_eq!(creds.account_from(None), None);
        assert_eq!(creds.account_from(Some("")), None);
        assert_eq!(creds.account_from(Some("not.a.jwt")), None);
        let token = creds.issue_token(3).unwrap();
        assert_eq!(creds.account_from(Some(&token)), Some(3));
    }

    #[test]
    fn test_expired_token_is_flagged() {
        let creds = Credentials::new("test-secret", 24).unwrap();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 9,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &creds.encoding).unwrap();
        let err = creds.verify_token(&token).unwrap_err();
        assert!(err.is_expired());
        assert!(!creds.verify_token("garbage").unwrap_err().is_expired());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(Credentials::new("", 24).is_err());
    }
}
