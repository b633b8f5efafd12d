//! Credential login, lockout accounting and session issuance.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::{RngCore, rng};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::jwt::TokenMint;
use super::password::{Hasher, normalize_email, validate_email, validate_password, validate_username};
use super::store::{SessionStore, UserStore};
use super::{AuthError, AuthPolicy};
use crate::audit::Auditor;
use crate::clock::Clock;
use crate::id::Id;
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::auth::{
    ClientMeta, ExtraClaims, LoginResult, NewAccount, NewUser, Purpose, Session, User,
};

/// Refresh tokens carry 256 bits of randomness.
const REFRESH_TOKEN_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

/// Generate an opaque URL-safe refresh token.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a token, as stored in the sessions table.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn std_to_chrono(d: std::time::Duration) -> Result<chrono::Duration, AuthError> {
    chrono::Duration::from_std(d).map_err(|e| AuthError::Internal(format!("duration: {e}")))
}

// ---------------------------------------------------------------------------
// AuthCore
// ---------------------------------------------------------------------------

pub struct AuthCore {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    mint: Arc<TokenMint>,
    hasher: Hasher,
    auditor: Auditor,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
}

impl AuthCore {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        mint: Arc<TokenMint>,
        hasher: Hasher,
        auditor: Auditor,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            mint,
            hasher,
            auditor,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Authenticate with email + password and open a session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &ClientMeta,
    ) -> Result<LoginResult, AuthError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.audit_login_failure(None, meta, "user_not_found", Some(&email))
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        if user.is_locked(now) {
            self.audit_login_failure(Some(user.id), meta, "account_locked", None)
                .await;
            return Err(AuthError::AccountLocked);
        }

        if !user.is_active {
            self.audit_login_failure(Some(user.id), meta, "account_inactive", None)
                .await;
            return Err(AuthError::AccountInactive);
        }

        if !self.hasher.verify(&user.password_hash, password)? {
            let lock_until = now + std_to_chrono(self.policy.lockout_duration)?;
            let attempts = self
                .users
                .register_failed_login(user.id, self.policy.lockout_threshold, lock_until, now)
                .await?;

            if attempts >= self.policy.lockout_threshold {
                warn!(user_id = %user.id, attempts, "account locked after failed logins");
                self.auditor
                    .record(
                        AuditEvent::new(AuditAction::AccountLocked)
                            .subject(user.id)
                            .ip(&meta.ip)
                            .user_agent(&meta.user_agent)
                            .outcome(false, "too many failed login attempts")
                            .detail("attempts", attempts)
                            .detail("locked_until", lock_until.to_rfc3339()),
                    )
                    .await;
                return Err(AuthError::AccountLocked);
            }

            self.auditor
                .record(
                    AuditEvent::new(AuditAction::LoginFailed)
                        .subject(user.id)
                        .ip(&meta.ip)
                        .user_agent(&meta.user_agent)
                        .outcome(false, "invalid_password")
                        .detail("attempts", attempts),
                )
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        let mut result = self.open_session(user, meta, now).await?;
        self.users.record_login_success(result.user.id, now).await?;
        result.user.failed_login_attempts = 0;
        result.user.locked_until = None;
        result.user.last_login_at = Some(now);

        info!(user_id = %result.user.id, "login succeeded");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::LoginSuccess)
                    .subject(result.user.id)
                    .ip(&meta.ip)
                    .user_agent(&meta.user_agent)
                    .detail("success", true),
            )
            .await;
        Ok(result)
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed; replaying it fails with `InvalidToken`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        meta: &ClientMeta,
    ) -> Result<LoginResult, AuthError> {
        let now = self.clock.now();
        let session = self
            .sessions
            .find_by_refresh(&token_digest(refresh_token), now)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        // Losing a concurrent rotation means the token was already spent.
        if !self.sessions.delete(session.id).await? {
            debug!(session_id = %session.id, "refresh lost rotation race");
            return Err(AuthError::InvalidToken);
        }

        let result = self.open_session(user, meta, now).await?;
        self.auditor
            .record(
                AuditEvent::new(AuditAction::SessionRefreshed)
                    .subject(result.user.id)
                    .ip(&meta.ip)
                    .user_agent(&meta.user_agent),
            )
            .await;
        Ok(result)
    }

    /// Close the session behind `bearer`.
    pub async fn logout(
        &self,
        bearer: &str,
        user_id: Id,
        meta: &ClientMeta,
    ) -> Result<(), AuthError> {
        let removed = self.sessions.delete_by_bearer(&token_digest(bearer)).await?;
        debug!(user_id = %user_id, removed, "logout");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::Logout)
                    .subject(user_id)
                    .ip(&meta.ip)
                    .user_agent(&meta.user_agent),
            )
            .await;
        Ok(())
    }

    /// Resolve a bearer to its user. Requires a valid signature, the session
    /// purpose, a live session record and an active account.
    pub async fn user_from_bearer(&self, bearer: &str) -> Result<User, AuthError> {
        let claims = self.mint.verify_purpose(bearer, Purpose::Session)?;
        let user_id: Id = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        let session = self
            .sessions
            .find_by_bearer(&token_digest(bearer), self.clock.now())
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if session.user_id != user_id {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }
        Ok(user)
    }

    /// Number of sessions whose bearer is still live.
    pub async fn active_session_count(&self, user_id: Id) -> Result<i64, AuthError> {
        Ok(self
            .sessions
            .count_active_for_user(user_id, self.clock.now())
            .await?)
    }

    pub async fn change_password(
        &self,
        user_id: Id,
        current: &str,
        new_password: &str,
        meta: &ClientMeta,
    ) -> Result<(), AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !self.hasher.verify(&user.password_hash, current)? {
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(new_password)?;

        let hash = self.hasher.hash(new_password)?;
        self.users.update_password(user_id, &hash, self.clock.now()).await?;

        info!(user_id = %user_id, "password changed");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::PasswordChanged)
                    .subject(user_id)
                    .ip(&meta.ip)
                    .user_agent(&meta.user_agent),
            )
            .await;
        Ok(())
    }

    /// Validate and create an account.
    pub async fn create_user(
        &self,
        account: NewAccount,
        actor: Option<Id>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(&account.email);
        validate_email(&email)?;
        validate_username(&account.username)?;
        validate_password(&account.password)?;

        let password_hash = self.hasher.hash(&account.password)?;
        let user = self
            .users
            .create(
                NewUser {
                    username: account.username,
                    email,
                    password_hash,
                    first_name: account.first_name,
                    last_name: account.last_name,
                    role: account.role,
                    admin_level: account.admin_level,
                },
                self.clock.now(),
            )
            .await?;

        let mut event = AuditEvent::new(AuditAction::UserCreated)
            .subject(user.id)
            .detail("role", user.role.as_str());
        if let Some(actor) = actor {
            event = event.actor(actor);
        }
        self.auditor.record(event).await;
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_email(&normalize_email(email)).await?)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn open_session(
        &self,
        user: User,
        meta: &ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<LoginResult, AuthError> {
        let (bearer, bearer_expires_at) = self.mint.issue(
            &user.id.to_string(),
            Purpose::Session,
            self.policy.bearer_ttl,
            ExtraClaims::for_user(&user),
        )?;
        let refresh = generate_refresh_token();
        let refresh_expires_at =
            (now + std_to_chrono(self.policy.refresh_ttl)?).max(bearer_expires_at);

        self.sessions
            .insert(Session {
                id: Id::new(),
                user_id: user.id,
                bearer_hash: token_digest(&bearer),
                refresh_hash: token_digest(&refresh),
                bearer_expires_at,
                refresh_expires_at,
                ip_address: meta.ip.clone(),
                user_agent: meta.user_agent.clone(),
                created_at: now,
            })
            .await?;

        Ok(LoginResult {
            bearer,
            refresh,
            user,
            expires_at: bearer_expires_at,
        })
    }

    async fn audit_login_failure(
        &self,
        user_id: Option<Id>,
        meta: &ClientMeta,
        reason: &str,
        email: Option<&str>,
    ) {
        let mut event = AuditEvent::new(AuditAction::LoginFailed)
            .ip(&meta.ip)
            .user_agent(&meta.user_agent)
            .outcome(false, reason);
        if let Some(id) = user_id {
            event = event.subject(id);
        }
        if let Some(email) = email {
            event = event.detail("email", email);
        }
        self.auditor.record(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn refresh_tokens_are_256_bit() {
        let token = generate_refresh_token();
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap().len(), 32);
        assert_ne!(token, generate_refresh_token());
    }
}
