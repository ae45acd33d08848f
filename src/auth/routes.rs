use std::ops::DerefMut;

use chrono::Utc;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_db_pools::sqlx::{self, Row};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::guards::RequesterIp;
use crate::auth::responses::{
    LoginRequest, ResetConsumeRequest, ResetIssuedResponse, ResetRequest, TokenResponse,
};
use crate::auth::{AuthError, AuthState};
use crate::models::MessageResponse;
use crate::validation::{SchemaRegistry, ValidationError};

type AuthRouteResult<T> = Result<Json<T>, status::Custom<Json<AuthErrorResponse>>>;

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct AuthErrorResponse {
    pub status: u16,
    pub message: String,
}

/// Exchange credentials for a bearer token.
///
/// Every credential failure (unknown utorid, account without a password,
/// wrong password) produces the same 401 so callers cannot probe which
/// accounts exist. The token carries the role as it stands at this moment.
#[openapi(tag = "Auth")]
#[post("/auth/tokens", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    registry: &State<SchemaRegistry>,
    pool: &State<sqlx::PgPool>,
    payload: Json<Value>,
) -> AuthRouteResult<TokenResponse> {
    let payload = payload.into_inner();
    let body = require_object(&payload)?;
    registry
        .validate("POST /auth/tokens", body)
        .map_err(respond_validation)?;
    let request: LoginRequest = deserialize_checked(payload)?;

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let row = sqlx::query("SELECT id, role, password_hash FROM users WHERE utorid = $1 FOR UPDATE")
        .bind(&request.utorid)
        .fetch_optional(tx.deref_mut())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let row = match row {
        Some(row) => row,
        None => return Err(invalid_credentials()),
    };

    let user_id: i32 = row
        .try_get("id")
        .map_err(|err| respond_error(AuthError::from(err)))?;
    let role: String = row
        .try_get("role")
        .map_err(|err| respond_error(AuthError::from(err)))?;
    let password_hash: Option<String> = row
        .try_get("password_hash")
        .map_err(|err| respond_error(AuthError::from(err)))?;

    // Accounts that never consumed their activation reset have no credential.
    let password_hash = match password_hash {
        Some(hash) => hash,
        None => return Err(invalid_credentials()),
    };

    let verified = state
        .password_service
        .verify_password(&request.password, &password_hash)
        .map_err(respond_error)?;

    if !verified {
        return Err(invalid_credentials());
    }

    sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
        .bind(now)
        .bind(user_id)
        .execute(tx.deref_mut())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let token = state
        .jwt_service
        .issue(&request.utorid, &role)
        .map_err(respond_error)?;

    tx.commit()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    Ok(Json(TokenResponse {
        token: token.token,
        expires_at: token.expires_at,
    }))
}

/// Start a password reset for an account.
///
/// Refusals are checked in a fixed order: the bootstrap superuser first,
/// then the requester's rate window, then account existence. The window is
/// recorded only after the token is durably stored, so a failed request
/// never costs the requester their next attempt.
#[openapi(tag = "Auth")]
#[post("/auth/resets", data = "<payload>")]
pub async fn request_reset(
    state: &State<AuthState>,
    registry: &State<SchemaRegistry>,
    pool: &State<sqlx::PgPool>,
    requester: RequesterIp,
    payload: Json<Value>,
) -> Result<status::Custom<Json<ResetIssuedResponse>>, status::Custom<Json<AuthErrorResponse>>> {
    let payload = payload.into_inner();
    let body = require_object(&payload)?;
    registry
        .validate("POST /auth/resets", body)
        .map_err(respond_validation)?;
    let request: ResetRequest = deserialize_checked(payload)?;

    if request.utorid == state.config.superuser_utorid {
        return Err(respond_error(AuthError::Forbidden));
    }

    let now = Utc::now();
    if let Err(retry_after) = state.rate_limiter.check(requester.0, now) {
        log::debug!(
            "reset request from {} throttled for another {}s",
            requester.0,
            retry_after.num_seconds()
        );
        return Err(respond_error(AuthError::RateLimited));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let user_id: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE utorid = $1")
        .bind(&request.utorid)
        .fetch_optional(tx.deref_mut())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let user_id = match user_id {
        Some(id) => id,
        None => return Err(respond_error(AuthError::AccountNotFound)),
    };

    let issued = state
        .reset_store
        .issue_tx(&mut tx, user_id, now)
        .await
        .map_err(respond_error)?;

    tx.commit()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    state.rate_limiter.record(requester.0, now);

    Ok(status::Custom(
        Status::Accepted,
        Json(ResetIssuedResponse {
            reset_token: issued.token.to_string(),
            expires_at: issued.expires_at,
        }),
    ))
}

/// Consume a reset token and install a new password.
///
/// A token unknown to the store and one that never parsed as a UUID are the
/// same 404. Expired tokens are deleted on contact and reported as 410. The
/// utorid in the body must belong to the token's owner; the password update
/// and the token deletion commit together or not at all.
#[openapi(tag = "Auth")]
#[post("/auth/resets/<reset_token>", data = "<payload>")]
pub async fn consume_reset(
    state: &State<AuthState>,
    registry: &State<SchemaRegistry>,
    pool: &State<sqlx::PgPool>,
    reset_token: &str,
    payload: Json<Value>,
) -> AuthRouteResult<MessageResponse> {
    let payload = payload.into_inner();
    let body = require_object(&payload)?;
    registry
        .validate("POST /auth/resets/<reset_token>", body)
        .map_err(respond_validation)?;
    let request: ResetConsumeRequest = deserialize_checked(payload)?;

    let token = match Uuid::parse_str(reset_token) {
        Ok(token) => token,
        Err(_) => return Err(respond_error(AuthError::ResetTokenNotFound)),
    };

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    let row = state
        .reset_store
        .lookup_for_update_tx(&mut tx, token)
        .await
        .map_err(respond_error)?;

    let row = match row {
        Some(row) => row,
        None => return Err(respond_error(AuthError::ResetTokenNotFound)),
    };

    if row.expires_at <= now {
        // Reap on contact; the sweeper only covers tokens never presented.
        state
            .reset_store
            .delete_tx(&mut tx, token)
            .await
            .map_err(respond_error)?;
        tx.commit()
            .await
            .map_err(|err| respond_error(AuthError::from(err)))?;
        return Err(respond_error(AuthError::ResetTokenExpired));
    }

    let owner: String = sqlx::query_scalar("SELECT utorid FROM users WHERE id = $1")
        .bind(row.user_id)
        .fetch_one(tx.deref_mut())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    if owner != request.utorid {
        return Err(respond_error(AuthError::Unauthorized));
    }

    let hash = state
        .password_service
        .hash_password(&request.password)
        .map_err(respond_error)?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&hash)
        .bind(row.user_id)
        .execute(tx.deref_mut())
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    state
        .reset_store
        .delete_tx(&mut tx, token)
        .await
        .map_err(respond_error)?;

    tx.commit()
        .await
        .map_err(|err| respond_error(AuthError::from(err)))?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

fn require_object(
    payload: &Value,
) -> Result<&serde_json::Map<String, Value>, status::Custom<Json<AuthErrorResponse>>> {
    payload
        .as_object()
        .ok_or_else(|| respond_message(Status::BadRequest, "request body must be a JSON object"))
}

/// Deserialize a body that already passed its whitelist schema. A failure
/// here still maps to a 400 rather than panicking.
fn deserialize_checked<T: serde::de::DeserializeOwned>(
    payload: Value,
) -> Result<T, status::Custom<Json<AuthErrorResponse>>> {
    serde_json::from_value(payload)
        .map_err(|_| respond_message(Status::BadRequest, "malformed request body"))
}

fn respond_validation(err: ValidationError) -> status::Custom<Json<AuthErrorResponse>> {
    match &err {
        ValidationError::UnknownEndpoint(key) => {
            log::error!("no validation schema registered for {key}");
            respond_message(
                Status::InternalServerError,
                "request validation is unavailable for this endpoint",
            )
        }
        _ => respond_message(Status::BadRequest, err.to_string()),
    }
}

fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    if status == Status::InternalServerError {
        log::error!("auth request failed: {err}");
    }
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message: err.to_string(),
        }),
    )
}

fn respond_message(
    status: Status,
    message: impl Into<String>,
) -> status::Custom<Json<AuthErrorResponse>> {
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message: message.into(),
        }),
    )
}

fn invalid_credentials() -> status::Custom<Json<AuthErrorResponse>> {
    respond_error(AuthError::InvalidCredentials)
}
