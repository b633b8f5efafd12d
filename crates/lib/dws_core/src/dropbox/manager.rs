//! Dropbox token lifecycle.
//!
//! [`TokenManager`] is the only writer of the Dropbox configuration. It
//! seals every secret before it reaches the store, refreshes the access
//! token when it is within [`REFRESH_SKEW`](crate::models::dropbox::REFRESH_SKEW)
//! of expiry, and escalates to `NeedsReauth` after
//! [`REAUTH_THRESHOLD`] consecutive refresh failures.
//!
//! Refreshes are single-flight: the refresh gate is held across
//! "decide to refresh → provider call → store update", and callers that
//! queued behind an in-flight refresh receive its result instead of starting
//! another one. Returning an already-fresh token takes no lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::DropboxError;
use super::oauth::OAuthClient;
use super::store::ConfigStore;
use crate::audit::Auditor;
use crate::clock::Clock;
use crate::crypto::CryptoBox;
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::auth::Actor;
use crate::models::dropbox::{
    ConnectionState, DropboxConfig, DropboxStatus, REAUTH_THRESHOLD, TokenResponse,
};
use crate::store::StoreError;

/// Recorded when sealed secrets no longer open under the current key.
const UNREADABLE_CREDENTIALS: &str =
    "stored credentials unreadable (encryption key changed?); re-authorize Dropbox";

/// Input for completing the OAuth authorize flow.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub app_key: String,
    pub app_secret: String,
    pub code: String,
    pub redirect_uri: Option<String>,
    pub parent_folder: String,
}

#[derive(Default)]
struct RefreshSlot {
    /// Completed refreshes so far.
    epoch: u64,
    last: Option<Result<String, DropboxError>>,
}

pub struct TokenManager {
    store: Arc<dyn ConfigStore>,
    oauth: Arc<dyn OAuthClient>,
    crypto: Arc<CryptoBox>,
    auditor: Auditor,
    clock: Arc<dyn Clock>,
    gate: Mutex<RefreshSlot>,
    /// Mirror of `RefreshSlot::epoch`, readable without the gate.
    epoch: AtomicU64,
    background_refresh: AtomicBool,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        oauth: Arc<dyn OAuthClient>,
        crypto: Arc<CryptoBox>,
        auditor: Auditor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            oauth,
            crypto,
            auditor,
            clock,
            gate: Mutex::new(RefreshSlot::default()),
            epoch: AtomicU64::new(0),
            background_refresh: AtomicBool::new(false),
        }
    }

    /// Flag shown in the status view; set by the background refresher.
    pub fn set_background_refresh(&self, running: bool) {
        self.background_refresh.store(running, Ordering::Relaxed);
    }

    pub fn authorization_url(
        &self,
        app_key: &str,
        redirect_uri: Option<&str>,
    ) -> Result<String, DropboxError> {
        if app_key.trim().is_empty() {
            return Err(DropboxError::Validation("app key is required".into()));
        }
        self.oauth.authorize_url(app_key.trim(), redirect_uri)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> Result<ConnectionState, DropboxError> {
        match self.store.get().await.map_err(DropboxError::from) {
            Ok(config) => Ok(config.state(self.clock.now())),
            Err(DropboxError::NotConfigured) => Ok(ConnectionState::Unconfigured),
            Err(e) => Err(e),
        }
    }

    pub async fn status(&self) -> Result<DropboxStatus, DropboxError> {
        let background = self.background_refresh.load(Ordering::Relaxed);
        match self.store.get().await.map_err(DropboxError::from) {
            Ok(config) => Ok(DropboxStatus::from_config(
                &config,
                self.clock.now(),
                background,
            )),
            Err(DropboxError::NotConfigured) => Ok(DropboxStatus::unconfigured(background)),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Authorize
    // -----------------------------------------------------------------------

    /// Exchange an authorization code and store the resulting credentials,
    /// replacing any previous configuration and clearing failure state.
    pub async fn authorize(
        &self,
        req: AuthorizeRequest,
        actor: &Actor,
    ) -> Result<DropboxStatus, DropboxError> {
        for (field, value) in [
            ("app key", &req.app_key),
            ("app secret", &req.app_secret),
            ("authorization code", &req.code),
        ] {
            if value.trim().is_empty() {
                return Err(DropboxError::Validation(format!("{field} is required")));
            }
        }
        let app_key = req.app_key.trim();
        let parent_folder = req.parent_folder.trim().to_string();

        let token = self
            .oauth
            .exchange_code(
                req.code.trim(),
                app_key,
                req.app_secret.trim(),
                req.redirect_uri.as_deref(),
            )
            .await?;

        let config = {
            let mut slot = self.gate.lock().await;
            let now = self.clock.now();

            let refresh_token = token.refresh_token.as_deref().unwrap_or_default();
            let created_at = match self.store.get().await {
                Ok(existing) => Some(existing.created_at),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };

            let config = DropboxConfig {
                app_key: app_key.to_string(),
                app_secret_sealed: self.crypto.seal(req.app_secret.trim())?,
                refresh_token_sealed: self.crypto.seal(refresh_token)?,
                access_token_sealed: self.crypto.seal(&token.access_token)?,
                token_expiry: Some(expiry_from(&token, now)),
                parent_folder: parent_folder.clone(),
                is_connected: true,
                last_refresh_success: Some(now),
                last_refresh_attempt: Some(now),
                consecutive_failures: 0,
                last_error: None,
                created_by: Some(actor.user_id),
                created_at: created_at.unwrap_or(now),
                updated_at: now,
            };
            if created_at.is_some() {
                self.store.replace(config.clone()).await?;
            } else {
                self.store.create(config.clone()).await?;
            }
            // Waiters queued behind an earlier refresh must see the new
            // credentials, not that refresh's outcome.
            slot.last = None;
            config
        };

        if !parent_folder.is_empty()
            && let Err(e) = self
                .oauth
                .ensure_folder(&token.access_token, &parent_folder)
                .await
        {
            warn!(folder = %parent_folder, error = %e, "could not ensure Dropbox parent folder");
        }

        info!(account_id = ?token.account_id, "dropbox authorized");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::DropboxAuthorize)
                    .actor(actor.user_id)
                    .ip(&actor.meta.ip)
                    .user_agent(&actor.meta.user_agent)
                    .detail("success", true)
                    .detail("account_id", token.account_id.clone().unwrap_or_default())
                    .detail("parent_folder", parent_folder.as_str()),
            )
            .await;

        let background = self.background_refresh.load(Ordering::Relaxed);
        Ok(DropboxStatus::from_config(&config, self.clock.now(), background))
    }

    // -----------------------------------------------------------------------
    // Token access
    // -----------------------------------------------------------------------

    /// A usable access token, refreshing first when the stored one is stale.
    pub async fn ensure_fresh(&self) -> Result<String, DropboxError> {
        let config = self.store.get().await?;
        match config.state(self.clock.now()) {
            ConnectionState::NeedsReauth => Err(DropboxError::NeedsReauth),
            ConnectionState::Connected => match self.crypto.open(&config.access_token_sealed) {
                Ok(token) => Ok(token),
                Err(_) => self.record_unreadable().await,
            },
            ConnectionState::Stale | ConnectionState::Unconfigured => {
                self.refresh_single_flight(false).await
            }
        }
    }

    /// Refresh now regardless of the remaining token lifetime.
    pub async fn force_refresh(&self, actor: &Actor) -> Result<DateTime<Utc>, DropboxError> {
        let result = self.refresh_single_flight(true).await;
        let expiry = match &result {
            Ok(_) => self.store.get().await?.token_expiry,
            Err(_) => None,
        };

        let event = AuditEvent::new(AuditAction::DropboxForceRefresh)
            .actor(actor.user_id)
            .ip(&actor.meta.ip)
            .user_agent(&actor.meta.user_agent);
        let event = match &result {
            Ok(_) => event.detail("success", true),
            Err(e) => event.outcome(false, &e.to_string()),
        };
        self.auditor.record(event).await;

        result?;
        expiry.ok_or_else(|| DropboxError::Internal("refreshed token has no expiry".into()))
    }

    /// Ensure a fresh token, then prove it works against the API.
    pub async fn test(&self, actor: &Actor) -> Result<(), DropboxError> {
        let result = match self.ensure_fresh().await {
            Ok(token) => {
                let probe = self.oauth.probe(&token).await;
                let now = self.clock.now();
                match &probe {
                    Ok(()) => self.store.mark_attempt(true, None, now).await?,
                    Err(e) => {
                        self.store
                            .mark_attempt(false, Some(&e.to_string()), now)
                            .await?
                    }
                }
                probe
            }
            Err(DropboxError::NotConfigured) => Err(DropboxError::NotConfigured),
            Err(e) => {
                if let Err(store_err) = self
                    .store
                    .mark_attempt(false, Some(&e.to_string()), self.clock.now())
                    .await
                {
                    warn!(error = %store_err, "could not record dropbox test outcome");
                }
                Err(e)
            }
        };

        let event = AuditEvent::new(AuditAction::DropboxTestConnection)
            .actor(actor.user_id)
            .ip(&actor.meta.ip)
            .user_agent(&actor.meta.user_agent);
        let event = match &result {
            Ok(()) => event.detail("success", true),
            Err(e) => event.outcome(false, &e.to_string()),
        };
        self.auditor.record(event).await;
        result
    }

    /// Remove the configuration. Later calls see `NotConfigured`.
    pub async fn delete(&self, actor: &Actor) -> Result<(), DropboxError> {
        {
            let mut slot = self.gate.lock().await;
            self.store.delete().await?;
            slot.last = None;
        }
        info!(user_id = %actor.user_id, "dropbox configuration deleted");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::DropboxDeleteConfiguration)
                    .actor(actor.user_id)
                    .ip(&actor.meta.ip)
                    .user_agent(&actor.meta.user_agent)
                    .detail("success", true),
            )
            .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Refresh internals
    // -----------------------------------------------------------------------

    async fn refresh_single_flight(&self, force: bool) -> Result<String, DropboxError> {
        let observed = self.epoch.load(Ordering::Acquire);
        let mut slot = self.gate.lock().await;

        if slot.epoch != observed
            && let Some(result) = &slot.last
        {
            debug!("joined in-flight dropbox refresh");
            return result.clone();
        }

        // Re-read under the gate: authorize or another refresh may have
        // changed the record while we waited.
        let config = self.store.get().await?;
        let now = self.clock.now();
        match config.state(now) {
            ConnectionState::NeedsReauth => return Err(DropboxError::NeedsReauth),
            ConnectionState::Connected if !force => {
                if let Ok(token) = self.crypto.open(&config.access_token_sealed) {
                    return Ok(token);
                }
            }
            _ => {}
        }

        let result = self.refresh_locked(&config, now).await;
        slot.epoch += 1;
        slot.last = Some(result.clone());
        self.epoch.store(slot.epoch, Ordering::Release);
        result
    }

    /// Must be called with the refresh gate held.
    async fn refresh_locked(
        &self,
        config: &DropboxConfig,
        now: DateTime<Utc>,
    ) -> Result<String, DropboxError> {
        let (refresh_token, app_secret) = match (
            self.crypto.open(&config.refresh_token_sealed),
            self.crypto.open(&config.app_secret_sealed),
        ) {
            (Ok(refresh), Ok(secret)) => (refresh, secret),
            _ => return self.record_unreadable().await,
        };

        match self
            .oauth
            .refresh(&refresh_token, &config.app_key, &app_secret)
            .await
        {
            Ok(token) => {
                let access_sealed = self.crypto.seal(&token.access_token)?;
                let refresh_sealed = match token.refresh_token.as_deref() {
                    Some(rt) if !rt.is_empty() => Some(self.crypto.seal(rt)?),
                    _ => None,
                };
                let expires_at = expiry_from(&token, now);
                self.store
                    .commit_refresh(&access_sealed, refresh_sealed.as_deref(), expires_at, now)
                    .await?;
                info!(expires_at = %expires_at, "dropbox access token refreshed");
                Ok(token.access_token)
            }
            Err(e) => {
                let failures = self
                    .store
                    .record_refresh_failure(&e.to_string(), now)
                    .await?;
                warn!(failures, error = %e, "dropbox token refresh failed");
                if failures >= REAUTH_THRESHOLD {
                    warn!("dropbox needs re-authorization");
                    Err(DropboxError::NeedsReauth)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn record_unreadable(&self) -> Result<String, DropboxError> {
        warn!("stored dropbox credentials cannot be opened with the current encryption key");
        self.store
            .mark_attempt(false, Some(UNREADABLE_CREDENTIALS), self.clock.now())
            .await?;
        Err(DropboxError::NeedsReauth)
    }
}

fn expiry_from(token: &TokenResponse, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(token.expires_in.max(0))
}
