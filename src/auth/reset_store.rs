use std::ops::DerefMut;

use chrono::{DateTime, Duration, Utc};
use rocket_db_pools::sqlx::{self, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::auth::AuthResult;
use crate::auth::config::RESET_TOKEN_TTL_SECS;

#[derive(Debug, Clone)]
pub struct ResetTokenIssued {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A live reset-token row, read under a row lock.
#[derive(Debug, Clone)]
pub struct ResetTokenRow {
    pub token: Uuid,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

/// Persistence for one-time password-reset tokens.
///
/// Tokens are random UUIDs stored by value; a user holds at most one live
/// token, and issuing a new one replaces whatever was there. All mutating
/// operations run inside a caller-owned transaction so the reset-consumption
/// path can pair the token delete with the credential update atomically.
#[derive(Debug, Clone)]
pub struct ResetTokenStore {
    pool: PgPool,
}

impl ResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Issue a fresh token for `user_id`, replacing any token the user
    /// already holds. The replaced token stops working immediately.
    pub async fn issue_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> AuthResult<ResetTokenIssued> {
        let token = Uuid::new_v4();
        let expires_at = now + Duration::seconds(RESET_TOKEN_TTL_SECS);

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(tx.deref_mut())
            .await?;

        sqlx::query(
            "INSERT INTO password_reset_tokens (token, user_id, expires_at, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .execute(tx.deref_mut())
        .await?;

        Ok(ResetTokenIssued { token, expires_at })
    }

    /// Fetch a token under `FOR UPDATE` so concurrent consumers serialize;
    /// whoever loses the race sees the row gone and reports not-found.
    pub async fn lookup_for_update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: Uuid,
    ) -> AuthResult<Option<ResetTokenRow>> {
        let row = sqlx::query(
            "SELECT token, user_id, expires_at FROM password_reset_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(tx.deref_mut())
        .await?;

        match row {
            Some(row) => Ok(Some(ResetTokenRow {
                token: row.try_get("token")?,
                user_id: row.try_get("user_id")?,
                expires_at: row.try_get("expires_at")?,
            })),
            None => Ok(None),
        }
    }

    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: Uuid,
    ) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
            .bind(token)
            .execute(tx.deref_mut())
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete every token past its expiry. Called by the background sweeper;
    /// correctness does not depend on it, since expired rows are also
    /// rejected (and removed) on the consumption path.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
