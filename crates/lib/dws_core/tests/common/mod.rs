//! Shared wiring for the scenario tests: in-memory stores, a manual clock,
//! a capturing mailer and a scripted OAuth provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dws_core::audit::Auditor;
use dws_core::auth::AuthPolicy;
use dws_core::auth::jwt::TokenMint;
use dws_core::auth::password::Hasher;
use dws_core::auth::service::AuthCore;
use dws_core::clock::{Clock, ManualClock};
use dws_core::crypto::CryptoBox;
use dws_core::dropbox::DropboxError;
use dws_core::dropbox::manager::TokenManager;
use dws_core::dropbox::oauth::OAuthClient;
use dws_core::id::Id;
use dws_core::memory::{
    CapturingMailer, MemoryAuditStore, MemoryConfigStore, MemoryResetStore, MemorySessionStore,
    MemoryUserStore,
};
use dws_core::models::audit::AuditAction;
use dws_core::models::auth::{Actor, ClientMeta, NewAccount, Role, User};
use dws_core::models::dropbox::TokenResponse;
use dws_core::reset::ResetPolicy;
use dws_core::reset::flow::ResetFlow;

pub const JWT_SECRET: &[u8] = b"scenario-test-secret-0123456789abcdef";

pub fn meta(ip: &str) -> ClientMeta {
    ClientMeta::new(ip, "scenario-test")
}

/// Scripted provider. Refresh answers are popped from a queue; an empty
/// queue answers with a fresh token.
#[derive(Default)]
pub struct FakeOAuth {
    refresh_script: Mutex<VecDeque<Result<TokenResponse, DropboxError>>>,
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub issued: AtomicUsize,
}

impl FakeOAuth {
    pub fn script_refresh(&self, answer: Result<TokenResponse, DropboxError>) {
        self.refresh_script.lock().unwrap().push_back(answer);
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn next_token(&self, with_refresh: bool) -> TokenResponse {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenResponse {
            access_token: format!("access-{n}"),
            token_type: Some("bearer".into()),
            expires_in: 14_400,
            refresh_token: with_refresh.then(|| format!("refresh-{n}")),
            account_id: Some("dbid:scenario".into()),
            scope: None,
        }
    }
}

pub fn provider_500() -> DropboxError {
    DropboxError::Exchange("token endpoint returned 500 Internal Server Error".into())
}

#[async_trait]
impl OAuthClient for FakeOAuth {
    fn authorize_url(
        &self,
        app_key: &str,
        _redirect_uri: Option<&str>,
    ) -> Result<String, DropboxError> {
        Ok(format!("https://auth.example/authorize?client_id={app_key}"))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _app_key: &str,
        _app_secret: &str,
        _redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, DropboxError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if code == "bad" {
            return Err(DropboxError::Exchange("invalid_grant".into()));
        }
        Ok(self.next_token(true))
    }

    async fn refresh(
        &self,
        _refresh_token: &str,
        _app_key: &str,
        _app_secret: &str,
    ) -> Result<TokenResponse, DropboxError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up behind the gate.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let scripted = self.refresh_script.lock().unwrap().pop_front();
        match scripted {
            Some(answer) => answer,
            None => Ok(self.next_token(false)),
        }
    }

    async fn probe(&self, access_token: &str) -> Result<(), DropboxError> {
        if access_token.starts_with("access-") {
            Ok(())
        } else {
            Err(DropboxError::Probe("401 Unauthorized".into()))
        }
    }

    async fn ensure_folder(&self, _access_token: &str, _path: &str) -> Result<(), DropboxError> {
        Ok(())
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub tickets: Arc<MemoryResetStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub dropbox_store: Arc<MemoryConfigStore>,
    pub mailer: Arc<CapturingMailer>,
    pub oauth: Arc<FakeOAuth>,
    pub crypto: Arc<CryptoBox>,
    pub auth: AuthCore,
    pub reset: ResetFlow,
    pub tokens: Arc<TokenManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_crypto(CryptoBox::new([7u8; 32]))
    }

    pub fn with_crypto(crypto: CryptoBox) -> Self {
        let clock = ManualClock::starting_now();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let tickets = Arc::new(MemoryResetStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let dropbox_store = Arc::new(MemoryConfigStore::new());
        let mailer = Arc::new(CapturingMailer::new());
        let oauth = Arc::new(FakeOAuth::default());
        let crypto = Arc::new(crypto);

        let auditor = Auditor::new(audit.clone(), shared_clock.clone());
        let mint = Arc::new(TokenMint::new(JWT_SECRET, shared_clock.clone()));
        let hasher = Hasher::default();

        let auth = AuthCore::new(
            users.clone(),
            sessions.clone(),
            mint.clone(),
            hasher,
            auditor.clone(),
            shared_clock.clone(),
            AuthPolicy::default(),
        );
        let reset = ResetFlow::new(
            users.clone(),
            tickets.clone(),
            sessions.clone(),
            mint,
            hasher,
            mailer.clone(),
            auditor.clone(),
            shared_clock.clone(),
            ResetPolicy::default(),
        );
        let tokens = Arc::new(TokenManager::new(
            dropbox_store.clone(),
            oauth.clone(),
            crypto.clone(),
            auditor,
            shared_clock,
        ));

        Self {
            clock,
            users,
            sessions,
            tickets,
            audit,
            dropbox_store,
            mailer,
            oauth,
            crypto,
            auth,
            reset,
            tokens,
        }
    }

    pub async fn user(&self, username: &str, email: &str, password: &str) -> User {
        self.auth
            .create_user(
                NewAccount {
                    username: username.into(),
                    email: email.into(),
                    password: password.into(),
                    first_name: username.into(),
                    last_name: "Tester".into(),
                    role: Role::Physician,
                    admin_level: None,
                },
                None,
            )
            .await
            .unwrap()
    }

    pub fn admin(&self) -> Actor {
        Actor {
            user_id: Id::new(),
            meta: meta("10.9.9.9"),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.audit.events().iter().map(|e| e.action).collect()
    }

    /// The code in the most recent reset mail.
    pub fn last_code(&self) -> String {
        let mail = self.mailer.last().expect("a reset mail was sent");
        mail.body
            .split_whitespace()
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .expect("reset mail carries a six digit code")
            .to_string()
    }
}
