use chrono::{DateTime, NaiveDate, Utc};
use rocket_db_pools::sqlx::FromRow;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ===== User Rows =====

/// A program account as stored. `password_hash` never leaves this crate;
/// responses are built through the DTOs below.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    /// One of the enumerated role names, lowercase.
    pub role: String,
    pub points: i64,
    pub verified: bool,
    pub suspicious: bool,
    pub birthday: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// ===== Response Envelopes =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaginatedResponse<T> {
    pub count: i64,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub message: String,
}

// ===== User DTOs =====

/// Detail view of an account. Which fields are present depends on the
/// caller's tier: cashiers see the balance and verification state, managers
/// and up see the whole record. Absent and null mean the same thing on this
/// wire, so omitted fields double as nulls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i32,
    pub utorid: String,
    pub name: String,
    pub points: i64,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspicious: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserResponse {
    pub fn full(user: &User) -> Self {
        Self {
            id: user.id,
            utorid: user.utorid.clone(),
            name: user.name.clone(),
            points: user.points,
            verified: user.verified,
            email: Some(user.email.clone()),
            birthday: user.birthday,
            role: Some(user.role.clone()),
            suspicious: Some(user.suspicious),
            created_at: Some(user.created_at),
            last_login_at: user.last_login_at,
        }
    }

    /// Cashier view: enough to serve a member at the register.
    pub fn limited(user: &User) -> Self {
        Self {
            id: user.id,
            utorid: user.utorid.clone(),
            name: user.name.clone(),
            points: user.points,
            verified: user.verified,
            email: None,
            birthday: None,
            role: None,
            suspicious: None,
            created_at: None,
            last_login_at: None,
        }
    }
}

/// Response to account registration. Carries the activation reset token the
/// new member uses to set their first password.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: i32,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub reset_token: String,
    pub expires_at: DateTime<Utc>,
}
