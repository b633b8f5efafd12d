//! Persistence for the Dropbox configuration singleton.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::dropbox::DropboxConfig;
use crate::store::{StoreError, timed};

/// Storage for the single Dropbox configuration record.
///
/// Every write stamps `updated_at` with the supplied `now`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `NotFound` when nothing is configured.
    async fn get(&self) -> Result<DropboxConfig, StoreError>;

    /// `Conflict` when a record already exists.
    async fn create(&self, config: DropboxConfig) -> Result<(), StoreError>;

    /// `NotFound` when nothing is configured.
    async fn replace(&self, config: DropboxConfig) -> Result<(), StoreError>;

    /// Store new sealed tokens. The refresh token is only replaced when given.
    async fn update_tokens(
        &self,
        access_sealed: &str,
        refresh_sealed: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record the outcome of a refresh or probe. `last_refresh_success` moves
    /// only when `connected`.
    async fn mark_attempt(
        &self,
        connected: bool,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Bump the failure counter and mark disconnected. Returns the new count.
    async fn increment_failures(&self, now: DateTime<Utc>) -> Result<i32, StoreError>;

    /// Zero the failure counter, mark connected and stamp a success.
    async fn reset_failures(&self, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete(&self) -> Result<(), StoreError>;

    /// `update_tokens`, `reset_failures` and a successful `mark_attempt`.
    /// Implementations that can should apply all of it in one write.
    async fn commit_refresh(
        &self,
        access_sealed: &str,
        refresh_sealed: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_tokens(access_sealed, refresh_sealed, expires_at, now)
            .await?;
        self.reset_failures(now).await?;
        self.mark_attempt(true, None, now).await
    }

    /// `increment_failures` followed by `mark_attempt(false, error)`. Returns
    /// the new failure count.
    async fn record_refresh_failure(
        &self,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let failures = self.increment_failures(now).await?;
        self.mark_attempt(false, Some(error), now).await?;
        Ok(failures)
    }
}

const CONFIG_COLUMNS: &str = "app_key, app_secret_sealed, refresh_token_sealed, \
     access_token_sealed, token_expiry, parent_folder, is_connected, last_refresh_success, \
     last_refresh_attempt, consecutive_failures, last_error, created_by, created_at, updated_at";

/// `dropbox_config` table access. The row is pinned to `id = 1`.
#[derive(Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn not_configured() -> StoreError {
    StoreError::NotFound("dropbox configuration".into())
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn get(&self) -> Result<DropboxConfig, StoreError> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM dropbox_config WHERE id = 1");
        timed(sqlx::query_as::<_, DropboxConfig>(&sql).fetch_optional(&self.pool))
            .await?
            .ok_or_else(not_configured)
    }

    async fn create(&self, c: DropboxConfig) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO dropbox_config (id, {CONFIG_COLUMNS}) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        timed(
            sqlx::query(&sql)
                .bind(&c.app_key)
                .bind(&c.app_secret_sealed)
                .bind(&c.refresh_token_sealed)
                .bind(&c.access_token_sealed)
                .bind(c.token_expiry)
                .bind(&c.parent_folder)
                .bind(c.is_connected)
                .bind(c.last_refresh_success)
                .bind(c.last_refresh_attempt)
                .bind(c.consecutive_failures)
                .bind(&c.last_error)
                .bind(c.created_by)
                .bind(c.created_at)
                .bind(c.updated_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn replace(&self, c: DropboxConfig) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE dropbox_config SET \
                   app_key = $1, app_secret_sealed = $2, refresh_token_sealed = $3, \
                   access_token_sealed = $4, token_expiry = $5, parent_folder = $6, \
                   is_connected = $7, last_refresh_success = $8, last_refresh_attempt = $9, \
                   consecutive_failures = $10, last_error = $11, created_by = $12, \
                   created_at = $13, updated_at = $14 \
                 WHERE id = 1",
            )
            .bind(&c.app_key)
            .bind(&c.app_secret_sealed)
            .bind(&c.refresh_token_sealed)
            .bind(&c.access_token_sealed)
            .bind(c.token_expiry)
            .bind(&c.parent_folder)
            .bind(c.is_connected)
            .bind(c.last_refresh_success)
            .bind(c.last_refresh_attempt)
            .bind(c.consecutive_failures)
            .bind(&c.last_error)
            .bind(c.created_by)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn update_tokens(
        &self,
        access_sealed: &str,
        refresh_sealed: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE dropbox_config SET \
                   access_token_sealed = $1, \
                   refresh_token_sealed = COALESCE($2, refresh_token_sealed), \
                   token_expiry = $3, updated_at = $4 \
                 WHERE id = 1",
            )
            .bind(access_sealed)
            .bind(refresh_sealed)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn mark_attempt(
        &self,
        connected: bool,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE dropbox_config SET \
                   is_connected = $1, last_error = $2, last_refresh_attempt = $3, \
                   last_refresh_success = CASE WHEN $1 THEN $3 ELSE last_refresh_success END, \
                   updated_at = $3 \
                 WHERE id = 1",
            )
            .bind(connected)
            .bind(last_error)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn increment_failures(&self, now: DateTime<Utc>) -> Result<i32, StoreError> {
        timed(
            sqlx::query_scalar::<_, i32>(
                "UPDATE dropbox_config SET \
                   consecutive_failures = consecutive_failures + 1, \
                   is_connected = FALSE, updated_at = $1 \
                 WHERE id = 1 \
                 RETURNING consecutive_failures",
            )
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(not_configured)
    }

    async fn reset_failures(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE dropbox_config SET \
                   consecutive_failures = 0, is_connected = TRUE, last_error = NULL, \
                   last_refresh_success = $1, updated_at = $1 \
                 WHERE id = 1",
            )
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let result = timed(sqlx::query("DELETE FROM dropbox_config WHERE id = 1").execute(&self.pool))
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn commit_refresh(
        &self,
        access_sealed: &str,
        refresh_sealed: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE dropbox_config SET \
                   access_token_sealed = $1, \
                   refresh_token_sealed = COALESCE($2, refresh_token_sealed), \
                   token_expiry = $3, \
                   consecutive_failures = 0, is_connected = TRUE, last_error = NULL, \
                   last_refresh_success = $4, last_refresh_attempt = $4, updated_at = $4 \
                 WHERE id = 1",
            )
            .bind(access_sealed)
            .bind(refresh_sealed)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_configured());
        }
        Ok(())
    }

    async fn record_refresh_failure(
        &self,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        timed(
            sqlx::query_scalar::<_, i32>(
                "UPDATE dropbox_config SET \
                   consecutive_failures = consecutive_failures + 1, \
                   is_connected = FALSE, last_error = $1, \
                   last_refresh_attempt = $2, updated_at = $2 \
                 WHERE id = 1 \
                 RETURNING consecutive_failures",
            )
            .bind(error)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(not_configured)
    }
}
