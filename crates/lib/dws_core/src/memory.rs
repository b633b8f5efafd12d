//! In-memory stores and a capturing mailer.
//!
//! Used by tests and by the server's `--in-memory` mode. They follow the
//! same contracts as the Postgres stores, including the uniqueness rules
//! and expiry filters.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::audit::AuditStore;
use crate::auth::store::{SessionStore, UserStore};
use crate::dropbox::store::ConfigStore;
use crate::id::Id;
use crate::mail::smtp::SmtpConfigStore;
use crate::mail::{MailError, Mailer};
use crate::models::audit::AuditEvent;
use crate::models::auth::{NewUser, Session, User};
use crate::models::dropbox::DropboxConfig;
use crate::models::mail::{OutgoingMail, SmtpConfig};
use crate::models::reset::ResetTicket;
use crate::reset::store::ResetStore;
use crate::store::StoreError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Id, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the active flag; test helper for the inactive-account paths.
    pub fn set_active(&self, id: Id, active: bool) {
        if let Some(user) = lock(&self.users).get_mut(&id) {
            user.is_active = active;
        }
    }
}

fn user_not_found(id: Id) -> StoreError {
    StoreError::NotFound(format!("user {id}"))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        Ok(lock(&self.users)
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let email = user.email.trim().to_lowercase();
        let mut users = lock(&self.users);
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict("users_email_lower_key".into()));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }
        let created = User {
            id: Id::new(),
            username: user.username,
            email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            admin_level: user.admin_level,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn register_failed_login(
        &self,
        id: Id,
        threshold: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut users = lock(&self.users);
        let user = users.get_mut(&id).ok_or_else(|| user_not_found(id))?;
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= threshold {
            user.locked_until = Some(lock_until);
        }
        user.updated_at = now;
        Ok(user.failed_login_attempts)
    }

    async fn record_login_success(&self, id: Id, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = lock(&self.users).get_mut(&id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }

    async fn update_password(
        &self,
        id: Id,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = lock(&self.users);
        let user = users.get_mut(&id).ok_or_else(|| user_not_found(id))?;
        user.password_hash = password_hash.to_string();
        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.updated_at = now;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Id, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        let duplicate = self.sessions.iter().any(|s| {
            s.bearer_hash == session.bearer_hash || s.refresh_hash == session.refresh_hash
        });
        if duplicate {
            return Err(StoreError::Conflict("sessions_token_key".into()));
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_by_bearer(
        &self,
        bearer_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.bearer_hash == bearer_hash && s.bearer_expires_at > now)
            .map(|s| s.value().clone()))
    }

    async fn find_by_refresh(
        &self,
        refresh_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .find(|s| {
                s.refresh_hash == refresh_hash
                    && s.bearer_expires_at > now
                    && s.refresh_expires_at > now
            })
            .map(|s| s.value().clone()))
    }

    async fn delete(&self, id: Id) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(&id).is_some())
    }

    async fn delete_by_bearer(&self, bearer_hash: &str) -> Result<bool, StoreError> {
        let id = self
            .sessions
            .iter()
            .find(|s| s.bearer_hash == bearer_hash)
            .map(|s| *s.key());
        Ok(match id {
            Some(id) => self.sessions.remove(&id).is_some(),
            None => false,
        })
    }

    async fn delete_all_for_user(&self, user_id: Id) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - self.sessions.len()) as u64)
    }

    async fn count_active_for_user(
        &self,
        user_id: Id,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.bearer_expires_at > now)
            .count() as i64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.bearer_expires_at > now);
        Ok((before - self.sessions.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        lock(&self.events).push(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dropbox configuration
// ---------------------------------------------------------------------------

/// Uses the composed `commit_refresh`/`record_refresh_failure` defaults.
#[derive(Default)]
pub struct MemoryConfigStore {
    config: Mutex<Option<DropboxConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record, bypassing the trait.
    pub fn snapshot(&self) -> Option<DropboxConfig> {
        lock(&self.config).clone()
    }

    fn with_config<T>(
        &self,
        f: impl FnOnce(&mut DropboxConfig) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = lock(&self.config);
        let config = guard
            .as_mut()
            .ok_or_else(|| StoreError::NotFound("dropbox configuration".into()))?;
        Ok(f(config))
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> Result<DropboxConfig, StoreError> {
        self.with_config(|c| c.clone())
    }

    async fn create(&self, config: DropboxConfig) -> Result<(), StoreError> {
        let mut guard = lock(&self.config);
        if guard.is_some() {
            return Err(StoreError::Conflict("dropbox_config_pkey".into()));
        }
        *guard = Some(config);
        Ok(())
    }

    async fn replace(&self, config: DropboxConfig) -> Result<(), StoreError> {
        self.with_config(|c| *c = config)
    }

    async fn update_tokens(
        &self,
        access_sealed: &str,
        refresh_sealed: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_config(|c| {
            c.access_token_sealed = access_sealed.to_string();
            if let Some(refresh) = refresh_sealed {
                c.refresh_token_sealed = refresh.to_string();
            }
            c.token_expiry = Some(expires_at);
            c.updated_at = now;
        })
    }

    async fn mark_attempt(
        &self,
        connected: bool,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_config(|c| {
            c.is_connected = connected;
            c.last_error = last_error.map(str::to_string);
            c.last_refresh_attempt = Some(now);
            if connected {
                c.last_refresh_success = Some(now);
            }
            c.updated_at = now;
        })
    }

    async fn increment_failures(&self, now: DateTime<Utc>) -> Result<i32, StoreError> {
        self.with_config(|c| {
            c.consecutive_failures += 1;
            c.is_connected = false;
            c.updated_at = now;
            c.consecutive_failures
        })
    }

    async fn reset_failures(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_config(|c| {
            c.consecutive_failures = 0;
            c.is_connected = true;
            c.last_error = None;
            c.last_refresh_success = Some(now);
            c.updated_at = now;
        })
    }

    async fn delete(&self) -> Result<(), StoreError> {
        lock(&self.config)
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("dropbox configuration".into()))
    }
}

// ---------------------------------------------------------------------------
// Reset tickets
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryResetStore {
    tickets: DashMap<Id, ResetTicket>,
}

impl MemoryResetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[async_trait]
impl ResetStore for MemoryResetStore {
    async fn insert(&self, ticket: ResetTicket) -> Result<(), StoreError> {
        if self
            .tickets
            .iter()
            .any(|t| t.signed_token == ticket.signed_token)
        {
            return Err(StoreError::Conflict("password_reset_tokens_signed_token_key".into()));
        }
        self.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    async fn find_by_token(&self, signed_token: &str) -> Result<Option<ResetTicket>, StoreError> {
        Ok(self
            .tickets
            .iter()
            .find(|t| t.signed_token == signed_token)
            .map(|t| t.value().clone()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ResetTicket>, StoreError> {
        Ok(self
            .tickets
            .iter()
            .filter(|t| t.code == code)
            .max_by_key(|t| t.created_at)
            .map(|t| t.value().clone()))
    }

    async fn mark_used(&self, id: Id) -> Result<bool, StoreError> {
        Ok(match self.tickets.get_mut(&id) {
            Some(mut ticket) if !ticket.used => {
                ticket.used = true;
                true
            }
            _ => false,
        })
    }

    async fn count_since(&self, user_id: Id, since: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id && t.created_at > since)
            .count() as i64)
    }

    async fn count_since_by_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .tickets
            .iter()
            .filter(|t| t.ip_address == ip && t.created_at > since)
            .count() as i64)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let before = self.tickets.len();
        self.tickets
            .retain(|_, t| t.expires_at > now || t.created_at > issued_before);
        Ok((before - self.tickets.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySmtpConfigStore {
    config: Mutex<Option<SmtpConfig>>,
}

impl MemorySmtpConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SmtpConfigStore for MemorySmtpConfigStore {
    async fn get(&self) -> Result<Option<SmtpConfig>, StoreError> {
        Ok(lock(&self.config).clone())
    }

    async fn upsert(&self, config: SmtpConfig) -> Result<(), StoreError> {
        *lock(&self.config) = Some(config);
        Ok(())
    }
}

/// Records every message instead of sending it. Can be told to fail.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<bool>,
}

impl CapturingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        lock(&self.sent).clone()
    }

    pub fn last(&self) -> Option<OutgoingMail> {
        lock(&self.sent).last().cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if *lock(&self.failing) {
            return Err(MailError::Send("relay refused the message".into()));
        }
        lock(&self.sent).push(mail);
        Ok(())
    }
}
