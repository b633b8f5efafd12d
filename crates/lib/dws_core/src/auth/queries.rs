//! Postgres-backed user and session stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store::{SessionStore, UserStore};
use crate::id::Id;
use crate::models::auth::{NewUser, Session, User};
use crate::store::{StoreError, timed};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, \
     admin_level, is_active, failed_login_attempts, locked_until, last_login_at, \
     created_at, updated_at";

const SESSION_COLUMNS: &str = "id, user_id, bearer_hash, refresh_hash, bearer_expires_at, \
     refresh_expires_at, ip_address, user_agent, created_at";

/// Users table access.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        timed(
            sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        timed(sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool)).await
    }

    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users \
               (id, username, email, password_hash, first_name, last_name, role, admin_level, \
                is_active, failed_login_attempts, created_at, updated_at) \
             VALUES ($1, $2, lower($3), $4, $5, $6, $7, $8, TRUE, 0, $9, $9) \
             RETURNING {USER_COLUMNS}"
        );
        timed(
            sqlx::query_as::<_, User>(&sql)
                .bind(Id::new())
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.role)
                .bind(user.admin_level)
                .bind(now)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn register_failed_login(
        &self,
        id: Id,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let count = timed(
            sqlx::query_scalar::<_, i32>(
                "UPDATE users SET \
                   failed_login_attempts = failed_login_attempts + 1, \
                   locked_until = CASE WHEN failed_login_attempts + 1 >= $2 \
                                       THEN $3 ELSE locked_until END, \
                   updated_at = $4 \
                 WHERE id = $1 \
                 RETURNING failed_login_attempts",
            )
            .bind(id)
            .bind(threshold)
            .bind(lock_until)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await?;
        count.ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn record_login_success(&self, id: Id, now: DateTime<Utc>) -> Result<(), StoreError> {
        timed(
            sqlx::query(
                "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, \
                   last_login_at = $2, updated_at = $2 \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        id: Id,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = timed(
            sqlx::query(
                "UPDATE users SET password_hash = $2, failed_login_attempts = 0, \
                   locked_until = NULL, updated_at = $3 \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(password_hash)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}

/// Sessions table access.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        timed(
            sqlx::query(
                "INSERT INTO sessions \
                   (id, user_id, bearer_hash, refresh_hash, bearer_expires_at, \
                    refresh_expires_at, ip_address, user_agent, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.bearer_hash)
            .bind(&session.refresh_hash)
            .bind(session.bearer_expires_at)
            .bind(session.refresh_expires_at)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.created_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find_by_bearer(
        &self,
        bearer_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE bearer_hash = $1 AND bearer_expires_at > $2"
        );
        timed(
            sqlx::query_as::<_, Session>(&sql)
                .bind(bearer_hash)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_refresh(
        &self,
        refresh_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE refresh_hash = $1 AND bearer_expires_at > $2 AND refresh_expires_at > $2"
        );
        timed(
            sqlx::query_as::<_, Session>(&sql)
                .bind(refresh_hash)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn delete(&self, id: Id) -> Result<bool, StoreError> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_bearer(&self, bearer_hash: &str) -> Result<bool, StoreError> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE bearer_hash = $1")
                .bind(bearer_hash)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: Id) -> Result<u64, StoreError> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        timed(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND bearer_expires_at > $2",
            )
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE bearer_expires_at <= $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}
