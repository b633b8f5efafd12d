//! Persistence for password reset tickets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::id::Id;
use crate::models::reset::ResetTicket;
use crate::store::{StoreError, timed};

#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn insert(&self, ticket: ResetTicket) -> Result<(), StoreError>;

    async fn find_by_token(&self, signed_token: &str) -> Result<Option<ResetTicket>, StoreError>;

    /// Most recent ticket carrying `code`.
    async fn find_by_code(&self, code: &str) -> Result<Option<ResetTicket>, StoreError>;

    /// Flip `used` from false to true. Returns false when the ticket was
    /// already used (or does not exist), so exactly one caller wins.
    async fn mark_used(&self, id: Id) -> Result<bool, StoreError>;

    /// Tickets issued for `user_id` after `since`.
    async fn count_since(&self, user_id: Id, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Tickets requested from `ip` after `since`.
    async fn count_since_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Remove tickets that expired by `now` and were issued at or before
    /// `issued_before`. Younger tickets still count toward the request caps.
    /// Returns the number removed.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

const TICKET_COLUMNS: &str =
    "id, user_id, signed_token, code, expires_at, used, ip_address, created_at";

/// `password_reset_tokens` table access.
#[derive(Clone)]
pub struct PgResetStore {
    pool: PgPool,
}

impl PgResetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetStore for PgResetStore {
    async fn insert(&self, t: ResetTicket) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO password_reset_tokens ({TICKET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        timed(
            sqlx::query(&sql)
                .bind(t.id)
                .bind(t.user_id)
                .bind(&t.signed_token)
                .bind(&t.code)
                .bind(t.expires_at)
                .bind(t.used)
                .bind(&t.ip_address)
                .bind(t.created_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find_by_token(&self, signed_token: &str) -> Result<Option<ResetTicket>, StoreError> {
        let sql =
            format!("SELECT {TICKET_COLUMNS} FROM password_reset_tokens WHERE signed_token = $1");
        timed(
            sqlx::query_as::<_, ResetTicket>(&sql)
                .bind(signed_token)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ResetTicket>, StoreError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM password_reset_tokens WHERE code = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        timed(
            sqlx::query_as::<_, ResetTicket>(&sql)
                .bind(code)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn mark_used(&self, id: Id) -> Result<bool, StoreError> {
        let result = timed(
            sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE id = $1 AND used = FALSE")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_since(&self, user_id: Id, since: DateTime<Utc>) -> Result<i64, StoreError> {
        timed(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM password_reset_tokens WHERE user_id = $1 AND created_at > $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn count_since_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        timed(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM password_reset_tokens \
                 WHERE ip_address = $1 AND created_at > $2",
            )
            .bind(ip)
            .bind(since)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = timed(
            sqlx::query(
                "DELETE FROM password_reset_tokens \
                 WHERE expires_at <= $1 AND created_at <= $2",
            )
            .bind(now)
            .bind(issued_before)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}
