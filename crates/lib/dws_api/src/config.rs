//! API server configuration.

use dws_core::auth::jwt::resolve_jwt_secret;
use dws_core::bootstrap::SuperAdminSeed;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Base64 AES-256 key for sealing stored secrets. `None` runs with an
    /// ephemeral key.
    pub encryption_key: Option<String>,
    /// Redirect URI used when an authorize request does not name one.
    pub dropbox_redirect_uri: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable               | Default                          |
    /// |------------------------|----------------------------------|
    /// | `BIND_ADDR`            | `127.0.0.1:8080`                 |
    /// | `JWT_SECRET`           | generated & persisted to file    |
    /// | `ENCRYPTION_KEY`       | ephemeral (warned at startup)    |
    /// | `DROPBOX_REDIRECT_URI` | none                             |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            jwt_secret: resolve_jwt_secret(),
            encryption_key: non_empty_var("ENCRYPTION_KEY"),
            dropbox_redirect_uri: non_empty_var("DROPBOX_REDIRECT_URI"),
        }
    }

    /// The super admin seed from `SUPER_ADMIN_*`, if email and password are set.
    pub fn super_admin_seed() -> Option<SuperAdminSeed> {
        SuperAdminSeed::from_parts(
            non_empty_var("SUPER_ADMIN_EMAIL"),
            non_empty_var("SUPER_ADMIN_PASSWORD"),
            non_empty_var("SUPER_ADMIN_USERNAME"),
            non_empty_var("SUPER_ADMIN_FIRST_NAME"),
            non_empty_var("SUPER_ADMIN_LAST_NAME"),
        )
    }
}
