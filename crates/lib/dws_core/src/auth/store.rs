//! Persistence seams for users and sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::id::Id;
use crate::models::auth::{NewUser, Session, User};
use crate::store::StoreError;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Id) -> Result<Option<User>, StoreError>;

    /// Fails with `Conflict` on a duplicate email or username.
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError>;

    /// Atomically bump the failed-login counter. When the new count reaches
    /// `threshold`, also set `locked_until`. Returns the new count.
    async fn register_failed_login(
        &self,
        id: Id,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    /// Clear the counter and lock, and stamp `last_login_at`.
    async fn record_login_success(&self, id: Id, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn update_password(
        &self,
        id: Id,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), StoreError>;

    /// Session whose bearer is still live at `now`.
    async fn find_by_bearer(
        &self,
        bearer_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Session whose bearer and refresh token are both still live at `now`.
    async fn find_by_refresh(
        &self,
        refresh_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Returns whether a session was removed.
    async fn delete(&self, id: Id) -> Result<bool, StoreError>;

    async fn delete_by_bearer(&self, bearer_hash: &str) -> Result<bool, StoreError>;

    /// Returns the number of sessions removed.
    async fn delete_all_for_user(&self, user_id: Id) -> Result<u64, StoreError>;

    async fn count_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Remove sessions whose bearer has elapsed. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
