//! User account routes: registration, listing, and profile management.

use std::ops::DerefMut;

use chrono::{NaiveDate, Utc};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{get, patch, post, State};
use rocket_db_pools::sqlx;
use rocket_db_pools::Connection;
use rocket_okapi::openapi;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{AuthState, AuthUser, RequireCashier, RequireManager, Role};
use crate::db::PointsDb;
use crate::error::ApiError;
use crate::models::{
    MessageResponse, PaginatedResponse, RegistrationResponse, User, UserResponse,
};
use crate::routes::params::{bool_field, int_field, object_body, text_field, RawQuery};
use crate::validation::SchemaRegistry;

const USER_COLUMNS: &str = "id, utorid, name, email, password_hash, role, points, verified, \
                            suspicious, birthday, created_at, last_login_at";

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    utorid: String,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct PasswordChangeRequest {
    old: String,
    new: String,
}

async fn fetch_user_by_id(
    user_id: i32,
    db: &mut Connection<PointsDb>,
) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db.as_mut())
    .await?;

    Ok(user)
}

async fn fetch_user_by_utorid(
    utorid: &str,
    db: &mut Connection<PointsDb>,
) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE utorid = $1"
    ))
    .bind(utorid)
    .fetch_optional(db.as_mut())
    .await?;

    // An authenticated caller whose row is gone means the account was removed
    // after the token was issued.
    user.ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))
}

/// Register a new account. The account starts unverified with no credential;
/// the returned reset token is how the member sets their first password.
#[openapi(tag = "Users")]
#[post("/users", data = "<payload>")]
pub async fn register_user(
    _caller: RequireCashier,
    state: &State<AuthState>,
    registry: &State<SchemaRegistry>,
    pool: &State<sqlx::PgPool>,
    payload: Json<Value>,
) -> Result<status::Custom<Json<RegistrationResponse>>, ApiError> {
    let payload = payload.into_inner();
    registry.validate("POST /users", object_body(&payload)?)?;
    let request: RegisterRequest = serde_json::from_value(payload)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let taken: Option<i32> =
        sqlx::query_scalar("SELECT id FROM users WHERE utorid = $1 OR email = $2")
            .bind(&request.utorid)
            .bind(&request.email)
            .fetch_optional(tx.deref_mut())
            .await?;
    if taken.is_some() {
        return Err(ApiError::Conflict(
            "utorid or email already registered".to_string(),
        ));
    }

    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO users (utorid, name, email) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&request.utorid)
    .bind(&request.name)
    .bind(&request.email)
    .fetch_one(tx.deref_mut())
    .await?;

    let issued = state.reset_store.issue_tx(&mut tx, user_id, now).await?;
    tx.commit().await?;

    log::info!("registered user {} (id {user_id})", request.utorid);

    Ok(status::Custom(
        Status::Created,
        Json(RegistrationResponse {
            id: user_id,
            utorid: request.utorid,
            name: request.name,
            email: request.email,
            verified: false,
            reset_token: issued.token.to_string(),
            expires_at: issued.expires_at,
        }),
    ))
}

/// List accounts with optional filters, paginated.
#[openapi(tag = "Users")]
#[get("/users?<filters..>")]
pub async fn list_users(
    _caller: RequireManager,
    registry: &State<SchemaRegistry>,
    mut db: Connection<PointsDb>,
    filters: RawQuery,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    registry.validate("GET /users", &filters.0)?;

    let pattern = text_field(&filters.0, "name").map(|name| format!("%{name}%"));
    let role = text_field(&filters.0, "role");
    let verified = bool_field(&filters.0, "verified");
    let activated = bool_field(&filters.0, "activated");
    let page = int_field(&filters.0, "page").unwrap_or(1);
    let limit = int_field(&filters.0, "limit")
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;

    // A fixed statement with null-coalesced filters keeps one prepared query
    // regardless of which filters the caller supplied.
    let filter_clause = "WHERE ($1::text IS NULL OR name ILIKE $1 OR utorid ILIKE $1) \
         AND ($2::text IS NULL OR role = $2) \
         AND ($3::boolean IS NULL OR verified = $3) \
         AND ($4::boolean IS NULL OR (last_login_at IS NOT NULL) = $4)";

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {filter_clause}"))
        .bind(&pattern)
        .bind(&role)
        .bind(verified)
        .bind(activated)
        .fetch_one(&mut **db)
        .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users {filter_clause} ORDER BY id LIMIT $5 OFFSET $6"
    ))
    .bind(&pattern)
    .bind(&role)
    .bind(verified)
    .bind(activated)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **db)
    .await?;

    Ok(Json(PaginatedResponse {
        count,
        results: users.iter().map(UserResponse::full).collect(),
    }))
}

/// The caller's own profile, always the full view.
#[openapi(tag = "Users")]
#[get("/users/me")]
pub async fn get_me(
    caller: AuthUser,
    mut db: Connection<PointsDb>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = fetch_user_by_utorid(&caller.utorid, &mut db).await?;
    Ok(Json(UserResponse::full(&user)))
}

/// Look up an account by id. Cashiers see the limited view; managers and
/// above see everything.
#[openapi(tag = "Users")]
#[get("/users/<user_id>")]
pub async fn get_user(
    caller: RequireCashier,
    mut db: Connection<PointsDb>,
    user_id: i32,
) -> Result<Json<UserResponse>, ApiError> {
    let user = fetch_user_by_id(user_id, &mut db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;

    let response = if caller.0.role.is_at_least(Role::Manager) {
        UserResponse::full(&user)
    } else {
        UserResponse::limited(&user)
    };

    Ok(Json(response))
}

/// Manager updates to another account: verification, suspicious flag, email,
/// and role. Assigning manager or superuser is reserved for the superuser.
#[openapi(tag = "Users")]
#[patch("/users/<user_id>", data = "<payload>")]
pub async fn update_user(
    caller: RequireManager,
    registry: &State<SchemaRegistry>,
    mut db: Connection<PointsDb>,
    user_id: i32,
    payload: Json<Value>,
) -> Result<Json<UserResponse>, ApiError> {
    let payload = payload.into_inner();
    let body = object_body(&payload)?;
    registry.validate("PATCH /users/<user_id>", body)?;

    let email = text_field(body, "email");
    let verified = bool_field(body, "verified");
    let suspicious = bool_field(body, "suspicious");
    let role = text_field(body, "role");

    if email.is_none() && verified.is_none() && suspicious.is_none() && role.is_none() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    if let Some(name) = &role {
        if let Some(target) = Role::from_str(name) {
            if target > Role::Cashier && !caller.0.role.is_at_least(Role::Superuser) {
                return Err(ApiError::Forbidden(
                    "only the superuser may assign this role".to_string(),
                ));
            }
        }
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users \
         SET email = COALESCE($1, email), \
             verified = COALESCE($2, verified), \
             suspicious = COALESCE($3, suspicious), \
             role = COALESCE($4, role) \
         WHERE id = $5 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&email)
    .bind(verified)
    .bind(suspicious)
    .bind(&role)
    .bind(user_id)
    .fetch_optional(&mut **db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;

    Ok(Json(UserResponse::full(&user)))
}

/// Self-service profile edits: display name, email, birthday.
#[openapi(tag = "Users")]
#[patch("/users/me", data = "<payload>")]
pub async fn update_me(
    caller: AuthUser,
    registry: &State<SchemaRegistry>,
    mut db: Connection<PointsDb>,
    payload: Json<Value>,
) -> Result<Json<UserResponse>, ApiError> {
    let payload = payload.into_inner();
    let body = object_body(&payload)?;
    registry.validate("PATCH /users/me", body)?;

    let name = text_field(body, "name");
    let email = text_field(body, "email");
    let birthday = text_field(body, "birthday")
        .and_then(|text| NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok());

    if name.is_none() && email.is_none() && birthday.is_none() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users \
         SET name = COALESCE($1, name), \
             email = COALESCE($2, email), \
             birthday = COALESCE($3, birthday) \
         WHERE utorid = $4 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&name)
    .bind(&email)
    .bind(birthday)
    .bind(&caller.utorid)
    .fetch_optional(&mut **db)
    .await?
    .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;

    Ok(Json(UserResponse::full(&user)))
}

/// Change the caller's password, verifying the old one first. The row is
/// locked so a concurrent reset cannot interleave.
#[openapi(tag = "Users")]
#[patch("/users/me/password", data = "<payload>")]
pub async fn change_password(
    caller: AuthUser,
    state: &State<AuthState>,
    registry: &State<SchemaRegistry>,
    pool: &State<sqlx::PgPool>,
    payload: Json<Value>,
) -> Result<Json<MessageResponse>, ApiError> {
    let payload = payload.into_inner();
    registry.validate("PATCH /users/me/password", object_body(&payload)?)?;
    let request: PasswordChangeRequest = serde_json::from_value(payload)?;

    let mut tx = pool.begin().await?;

    let row: Option<(i32, Option<String>)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE utorid = $1 FOR UPDATE")
            .bind(&caller.utorid)
            .fetch_optional(tx.deref_mut())
            .await?;
    let (user_id, stored) =
        row.ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;

    // An account that never set a password has nothing to match against.
    let stored =
        stored.ok_or_else(|| ApiError::Unauthorized("old password does not match".to_string()))?;
    if !state.password_service.verify_password(&request.old, &stored)? {
        return Err(ApiError::Unauthorized(
            "old password does not match".to_string(),
        ));
    }

    let hash = state.password_service.hash_password(&request.new)?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&hash)
        .bind(user_id)
        .execute(tx.deref_mut())
        .await?;
    tx.commit().await?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}
