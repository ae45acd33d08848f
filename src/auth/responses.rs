//! Wire types for the authentication and password-reset endpoints.
//!
//! Request types are deserialized from the raw JSON body only after it has
//! cleared the endpoint's whitelist schema, so their fields are known to be
//! present and well formed by the time serde sees them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoginRequest {
    pub utorid: String,
    pub password: String,
}

/// A freshly minted access token and the instant it stops working.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResetRequest {
    pub utorid: String,
}

/// Issued reset token. Returned directly to the requester; delivery to the
/// account holder is an operational concern outside this API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetIssuedResponse {
    pub reset_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResetConsumeRequest {
    pub utorid: String,
    pub password: String,
}
