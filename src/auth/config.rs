use crate::auth::{AuthError, AuthResult};

/// Seconds an access token remains valid after issuance. Fixed by the program
/// contract, deliberately not configurable.
pub const TOKEN_TTL_SECS: i64 = 7200;

/// Seconds a password-reset token remains valid after issuance.
pub const RESET_TOKEN_TTL_SECS: i64 = 3600;

/// Minimum seconds between accepted reset requests from one requester
/// address.
pub const RESET_REQUEST_WINDOW_SECS: i64 = 60;

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. Process-wide, set once at startup.
    pub jwt_secret: String,
    /// Utorid of the bootstrap superuser account. Password resets for this
    /// account are always refused.
    pub superuser_utorid: String,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = std::env::var("POINTS_JWT_SECRET")
            .map_err(|_| AuthError::Config("POINTS_JWT_SECRET is required".into()))?;
        let superuser_utorid =
            std::env::var("POINTS_SUPERUSER_UTORID").unwrap_or_else(|_| "superusr".into());

        Ok(Self {
            jwt_secret,
            superuser_utorid,
        })
    }
}
