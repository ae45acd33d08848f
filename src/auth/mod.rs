//! Authentication module: role ordering, configuration, credential handling,
//! token minting, password-reset lifecycle, Rocket request guards, and HTTP
//! route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod rate_limit;
pub mod reset_store;
pub mod responses;
pub mod roles;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, RequireCashier, RequireManager, RequireSuperuser, RequesterIp};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use rate_limit::ResetRateLimiter;
pub use reset_store::ResetTokenStore;
pub use roles::Role;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub reset_store: ResetTokenStore,
    pub rate_limiter: Arc<ResetRateLimiter>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        reset_store: ResetTokenStore,
        rate_limiter: ResetRateLimiter,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
            reset_store,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
