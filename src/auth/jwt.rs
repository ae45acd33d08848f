use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::auth::config::TOKEN_TTL_SECS;
use crate::auth::{AuthConfig, AuthResult};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity recovered from a verified token. The role is the snapshot taken
/// at issuance; a later role change leaves outstanding tokens untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub utorid: String,
    pub role: String,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            token_ttl: Duration::seconds(TOKEN_TTL_SECS),
        })
    }

    /// Mint a token for `utorid`, embedding `role` as it stands right now.
    pub fn issue(&self, utorid: &str, role: &str) -> AuthResult<SignedToken> {
        self.issue_at(utorid, role, Utc::now())
    }

    /// Mint a token with an explicit issue instant. Expiry lands exactly
    /// `TOKEN_TTL_SECS` after `issued_at`, so tests can craft tokens on
    /// either side of the boundary.
    pub fn issue_at(
        &self,
        utorid: &str,
        role: &str,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let expires_at = issued_at + self.token_ttl;

        let claims = AccessTokenClaims {
            sub: utorid.to_string(),
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Check signature and expiry. Every failure collapses into `None`;
    /// callers cannot tell an expired token from a tampered one.
    pub fn verify(&self, token: &str) -> Option<TokenIdentity> {
        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation).ok()?;
        Some(TokenIdentity {
            utorid: data.claims.sub,
            role: data.claims.role,
        })
    }
}
