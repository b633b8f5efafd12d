//! SMTP delivery and the admin-managed relay settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::{MailError, Mailer};
use crate::audit::Auditor;
use crate::clock::Clock;
use crate::crypto::{CryptoBox, CryptoError};
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::auth::Actor;
use crate::models::mail::{OutgoingMail, SmtpConfig, SmtpStatus, SmtpUpdate};
use crate::store::{StoreError, timed};

pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SmtpConfigStore: Send + Sync {
    async fn get(&self) -> Result<Option<SmtpConfig>, StoreError>;

    /// Create or overwrite the singleton.
    async fn upsert(&self, config: SmtpConfig) -> Result<(), StoreError>;
}

const SMTP_COLUMNS: &str =
    "host, port, username, password_sealed, from_email, from_name, updated_by, updated_at";

#[derive(Clone)]
pub struct PgSmtpConfigStore {
    pool: PgPool,
}

impl PgSmtpConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SmtpConfigStore for PgSmtpConfigStore {
    async fn get(&self) -> Result<Option<SmtpConfig>, StoreError> {
        let sql = format!("SELECT {SMTP_COLUMNS} FROM smtp_config WHERE id = 1");
        timed(sqlx::query_as::<_, SmtpConfig>(&sql).fetch_optional(&self.pool)).await
    }

    async fn upsert(&self, c: SmtpConfig) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO smtp_config (id, {SMTP_COLUMNS}) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
               host = EXCLUDED.host, port = EXCLUDED.port, username = EXCLUDED.username, \
               password_sealed = EXCLUDED.password_sealed, from_email = EXCLUDED.from_email, \
               from_name = EXCLUDED.from_name, updated_by = EXCLUDED.updated_by, \
               updated_at = EXCLUDED.updated_at"
        );
        timed(
            sqlx::query(&sql)
                .bind(&c.host)
                .bind(c.port)
                .bind(&c.username)
                .bind(&c.password_sealed)
                .bind(&c.from_email)
                .bind(&c.from_name)
                .bind(c.updated_by)
                .bind(c.updated_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Sends through the relay described by the stored [`SmtpConfig`]. The
/// config is loaded per message so admin edits apply immediately.
pub struct SmtpMailer {
    store: Arc<dyn SmtpConfigStore>,
    crypto: Arc<CryptoBox>,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(store: Arc<dyn SmtpConfigStore>, crypto: Arc<CryptoBox>) -> Self {
        Self {
            store,
            crypto,
            timeout: SEND_TIMEOUT,
        }
    }

    fn build_message(config: &SmtpConfig, mail: &OutgoingMail) -> Result<Message, MailError> {
        let from_addr: Address = config
            .from_email
            .parse()
            .map_err(|e| MailError::Invalid(format!("from: {e}")))?;
        let to_addr: Address = mail
            .to
            .parse()
            .map_err(|e| MailError::Invalid(format!("to: {e}")))?;

        let from_name = (!config.from_name.is_empty()).then(|| config.from_name.clone());
        let to_name = (!mail.recipient_name.is_empty()).then(|| mail.recipient_name.clone());

        Message::builder()
            .from(Mailbox::new(from_name, from_addr))
            .to(Mailbox::new(to_name, to_addr))
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| MailError::Send(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let config = self
            .store
            .get()
            .await?
            .filter(SmtpConfig::is_complete)
            .ok_or(MailError::NotConfigured)?;

        let password = self.crypto.open(&config.password_sealed).map_err(|e| {
            warn!(error = %e, "smtp password does not open under the current key");
            MailError::CredentialsUnreadable
        })?;
        let port = u16::try_from(config.port)
            .map_err(|_| MailError::Send(format!("invalid port {}", config.port)))?;

        let message = Self::build_message(&config, &mail)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Send(e.to_string()))?
            .port(port)
            .credentials(Credentials::new(config.username.clone(), password))
            .timeout(Some(self.timeout))
            .build();

        match tokio::time::timeout(self.timeout, transport.send(message)).await {
            Ok(Ok(_)) => {
                debug!(host = %config.host, "mail sent");
                Ok(())
            }
            Ok(Err(e)) => Err(MailError::Send(e.to_string())),
            Err(_) => Err(MailError::Timeout),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Admin view and update of the SMTP relay settings.
pub struct SmtpSettings {
    store: Arc<dyn SmtpConfigStore>,
    crypto: Arc<CryptoBox>,
    auditor: Auditor,
    clock: Arc<dyn Clock>,
}

impl SmtpSettings {
    pub fn new(
        store: Arc<dyn SmtpConfigStore>,
        crypto: Arc<CryptoBox>,
        auditor: Auditor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            crypto,
            auditor,
            clock,
        }
    }

    pub async fn get(&self) -> Result<SmtpStatus, MailError> {
        Ok(self
            .store
            .get()
            .await?
            .as_ref()
            .map(SmtpStatus::from)
            .unwrap_or_else(SmtpStatus::unconfigured))
    }

    /// Store new settings. A missing or empty password keeps the stored one.
    pub async fn update(&self, input: SmtpUpdate, actor: &Actor) -> Result<SmtpStatus, MailError> {
        let host = input.host.trim().to_string();
        let from_email = input.from_email.trim().to_string();
        if host.is_empty() {
            return Err(MailError::Invalid("host is required".into()));
        }
        if !(1..=i32::from(u16::MAX)).contains(&input.port) {
            return Err(MailError::Invalid(format!("invalid port {}", input.port)));
        }
        from_email
            .parse::<Address>()
            .map_err(|e| MailError::Invalid(format!("from: {e}")))?;

        let existing = self.store.get().await?;
        let password_changed = input.password.as_deref().is_some_and(|p| !p.is_empty());
        let password_sealed = match input.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => self.crypto.seal(password).map_err(seal_error)?,
            None => existing
                .map(|c| c.password_sealed)
                .unwrap_or_default(),
        };

        let config = SmtpConfig {
            host,
            port: input.port,
            username: input.username.trim().to_string(),
            password_sealed,
            from_email,
            from_name: input.from_name.trim().to_string(),
            updated_by: Some(actor.user_id),
            updated_at: self.clock.now(),
        };
        self.store.upsert(config.clone()).await?;

        info!(host = %config.host, port = config.port, "smtp settings updated");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::SmtpConfigUpdated)
                    .actor(actor.user_id)
                    .ip(&actor.meta.ip)
                    .user_agent(&actor.meta.user_agent)
                    .detail("host", config.host.as_str())
                    .detail("password_changed", password_changed),
            )
            .await;
        Ok(SmtpStatus::from(&config))
    }
}

fn seal_error(e: CryptoError) -> MailError {
    MailError::Send(format!("sealing smtp password: {e}"))
}
