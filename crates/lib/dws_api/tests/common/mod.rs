//! Router wired to in-memory stores, plus request helpers.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use dws_api::config::ApiConfig;
use dws_api::{AppState, router};
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
use dws_core::mail::smtp::SmtpSettings;
use dws_core::memory::{
    CapturingMailer, MemoryAuditStore, MemoryConfigStore, MemoryResetStore, MemorySessionStore,
    MemorySmtpConfigStore, MemoryUserStore,
};
use dws_core::models::auth::{AdminLevel, NewAccount, Role, User};
use dws_core::models::dropbox::TokenResponse;
use dws_core::reset::ResetPolicy;
use dws_core::reset::flow::ResetFlow;
use serde_json::Value;
use tower::ServiceExt;

/// Provider that accepts any code except "bad".
pub struct StubOAuth;

fn stub_token() -> TokenResponse {
    TokenResponse {
        access_token: "access-stub".into(),
        token_type: Some("bearer".into()),
        expires_in: 14_400,
        refresh_token: Some("refresh-stub".into()),
        account_id: Some("dbid:stub".into()),
        scope: None,
    }
}

#[async_trait]
impl OAuthClient for StubOAuth {
    fn authorize_url(
        &self,
        app_key: &str,
        redirect_uri: Option<&str>,
    ) -> Result<String, DropboxError> {
        Ok(format!(
            "https://auth.example/authorize?client_id={app_key}&redirect_uri={}",
            redirect_uri.unwrap_or("")
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _app_key: &str,
        _app_secret: &str,
        _redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, DropboxError> {
        if code == "bad" {
            return Err(DropboxError::Exchange("invalid_grant".into()));
        }
        Ok(stub_token())
    }

    async fn refresh(
        &self,
        _refresh_token: &str,
        _app_key: &str,
        _app_secret: &str,
    ) -> Result<TokenResponse, DropboxError> {
        Ok(TokenResponse {
            refresh_token: None,
            ..stub_token()
        })
    }

    async fn probe(&self, _access_token: &str) -> Result<(), DropboxError> {
        Ok(())
    }

    async fn ensure_folder(&self, _access_token: &str, _path: &str) -> Result<(), DropboxError> {
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub users: Arc<MemoryUserStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub mailer: Arc<CapturingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let mailer = Arc::new(CapturingMailer::new());
        let crypto = Arc::new(CryptoBox::new([9u8; 32]));

        let auditor = Auditor::new(audit.clone(), shared_clock.clone());
        let mint = Arc::new(TokenMint::new(b"api-test-secret", shared_clock.clone()));
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
            Arc::new(MemoryResetStore::new()),
            sessions,
            mint,
            hasher,
            mailer.clone(),
            auditor.clone(),
            shared_clock.clone(),
            ResetPolicy::default(),
        );
        let dropbox = TokenManager::new(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(StubOAuth),
            crypto.clone(),
            auditor.clone(),
            shared_clock.clone(),
        );
        let smtp = SmtpSettings::new(
            Arc::new(MemorySmtpConfigStore::new()),
            crypto,
            auditor,
            shared_clock,
        );

        let state = AppState {
            auth: Arc::new(auth),
            reset: Arc::new(reset),
            dropbox: Arc::new(dropbox),
            smtp: Arc::new(smtp),
            config: ApiConfig {
                bind_addr: "127.0.0.1:0".into(),
                jwt_secret: "api-test-secret".into(),
                encryption_key: None,
                dropbox_redirect_uri: Some("https://portal.example/dropbox".into()),
            },
        };

        Self {
            app: router(state.clone()),
            state,
            clock,
            users,
            audit,
            mailer,
        }
    }

    pub async fn user(&self, username: &str, email: &str, password: &str) -> User {
        self.account(username, email, password, None).await
    }

    pub async fn super_admin(&self, email: &str, password: &str) -> User {
        self.account("root", email, password, Some(AdminLevel::SuperAdmin))
            .await
    }

    async fn account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        admin_level: Option<AdminLevel>,
    ) -> User {
        let role = if admin_level.is_some() {
            Role::Admin
        } else {
            Role::Physician
        };
        self.state
            .auth
            .create_user(
                NewAccount {
                    username: username.into(),
                    email: email.into(),
                    password: password.into(),
                    first_name: username.into(),
                    last_name: "Tester".into(),
                    role,
                    admin_level,
                },
                None,
            )
            .await
            .unwrap()
    }

    /// Log in over HTTP and return the bearer.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, json)
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.10");
        if let Some(bearer) = bearer {
            builder = builder.header("authorization", format!("Bearer {bearer}"));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, bearer, None).await
    }

    pub async fn post(&self, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, bearer, Some(body)).await
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
