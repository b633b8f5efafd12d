//! Dropbox OAuth2 and API client.
//!
//! Builds the authorize URL, exchanges codes and refresh tokens at the token
//! endpoint, and makes the two authenticated API calls the token manager
//! needs (account probe and parent-folder creation).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::DropboxError;
use crate::models::dropbox::TokenResponse;

pub const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
pub const TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";
pub const API_BASE: &str = "https://api.dropboxapi.com/2";

/// Bound on every provider call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The provider's OAuth2 endpoints and API surface.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// URL an admin visits to grant offline access.
    fn authorize_url(&self, app_key: &str, redirect_uri: Option<&str>)
    -> Result<String, DropboxError>;

    async fn exchange_code(
        &self,
        code: &str,
        app_key: &str,
        app_secret: &str,
        redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, DropboxError>;

    /// The response may omit `refresh_token`; the stored one stays valid.
    async fn refresh(
        &self,
        refresh_token: &str,
        app_key: &str,
        app_secret: &str,
    ) -> Result<TokenResponse, DropboxError>;

    /// Cheap authenticated call proving the access token works.
    async fn probe(&self, access_token: &str) -> Result<(), DropboxError>;

    /// Create `path` if it does not exist yet.
    async fn ensure_folder(&self, access_token: &str, path: &str) -> Result<(), DropboxError>;
}

/// Endpoint set, overridable for tests.
#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        }
    }
}

/// reqwest-backed [`OAuthClient`].
#[derive(Debug, Clone)]
pub struct DropboxOAuthClient {
    http: reqwest::Client,
    endpoints: DropboxEndpoints,
}

impl DropboxOAuthClient {
    pub fn new() -> Result<Self, DropboxError> {
        Self::with_endpoints(DropboxEndpoints::default())
    }

    pub fn with_endpoints(endpoints: DropboxEndpoints) -> Result<Self, DropboxError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| DropboxError::Internal(format!("http client: {e}")))?;
        Ok(Self { http, endpoints })
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<TokenResponse, DropboxError> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| DropboxError::Exchange(format!("{what} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DropboxError::Exchange(format!("{what} HTTP {status}: {body}")));
        }

        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| DropboxError::Exchange(format!("{what} parse error: {e}")))?;
        if token.access_token.is_empty() {
            return Err(DropboxError::Exchange(format!(
                "{what} returned no access token"
            )));
        }
        Ok(token)
    }

    fn api_url(&self, route: &str) -> String {
        format!("{}/{route}", self.endpoints.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl OAuthClient for DropboxOAuthClient {
    fn authorize_url(
        &self,
        app_key: &str,
        redirect_uri: Option<&str>,
    ) -> Result<String, DropboxError> {
        let mut params = vec![
            ("client_id", app_key),
            ("response_type", "code"),
            ("token_access_type", "offline"),
        ];
        if let Some(uri) = redirect_uri.filter(|u| !u.is_empty()) {
            params.push(("redirect_uri", uri));
        }
        let url = Url::parse_with_params(&self.endpoints.authorize_url, &params)
            .map_err(|e| DropboxError::Validation(format!("authorize url: {e}")))?;
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        code: &str,
        app_key: &str,
        app_secret: &str,
        redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, DropboxError> {
        let mut params = vec![
            ("code", code),
            ("grant_type", "authorization_code"),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ];
        if let Some(uri) = redirect_uri.filter(|u| !u.is_empty()) {
            params.push(("redirect_uri", uri));
        }

        let token = self.post_token_form(&params, "code exchange").await?;
        if token.refresh_token.as_deref().is_none_or(str::is_empty) {
            return Err(DropboxError::Exchange(
                "code exchange returned no refresh token; offline access was not granted".into(),
            ));
        }
        debug!(account_id = ?token.account_id, "dropbox code exchanged");
        Ok(token)
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        app_key: &str,
        app_secret: &str,
    ) -> Result<TokenResponse, DropboxError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ];
        self.post_token_form(&params, "token refresh").await
    }

    async fn probe(&self, access_token: &str) -> Result<(), DropboxError> {
        let resp = self
            .http
            .post(self.api_url("users/get_current_account"))
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, "application/json")
            .body("null")
            .send()
            .await
            .map_err(|e| DropboxError::Probe(format!("account check failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DropboxError::Probe(format!("account check HTTP {status}: {body}")));
        }
        Ok(())
    }

    async fn ensure_folder(&self, access_token: &str, path: &str) -> Result<(), DropboxError> {
        let path = path.trim().trim_end_matches('/');
        if path.is_empty() {
            return Ok(());
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let resp = self
            .http
            .post(self.api_url("files/create_folder_v2"))
            .bearer_auth(access_token)
            .json(&json!({ "path": path, "autorename": false }))
            .send()
            .await
            .map_err(|e| DropboxError::Probe(format!("create folder failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            debug!(path = %path, "dropbox folder created");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::CONFLICT && body.contains("path/conflict") {
            debug!(path = %path, "dropbox folder already exists");
            return Ok(());
        }
        Err(DropboxError::Probe(format!("create folder HTTP {status}: {body}")))
    }
}
