//! Dropbox integration: persisted OAuth configuration, the provider client,
//! the token lifecycle manager and its background refresher.

pub mod manager;
pub mod oauth;
pub mod refresh;
pub mod store;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;

/// Dropbox integration errors.
///
/// `Clone` so a single in-flight refresh can hand its outcome to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropboxError {
    #[error("Dropbox is not configured")]
    NotConfigured,

    #[error("Dropbox needs to be re-authorized")]
    NeedsReauth,

    #[error("Dropbox token exchange failed: {0}")]
    Exchange(String),

    #[error("Dropbox API call failed: {0}")]
    Probe(String),

    #[error("stored Dropbox credentials are unreadable")]
    CorruptCiphertext,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration already exists")]
    AlreadyExists,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for DropboxError {
    fn from(err: StoreError) -> Self {
        match err {
            // The config row is a singleton; a missing row means unconfigured.
            StoreError::NotFound(_) => DropboxError::NotConfigured,
            StoreError::Conflict(_) => DropboxError::AlreadyExists,
            other => DropboxError::Store(other.to_string()),
        }
    }
}

impl From<CryptoError> for DropboxError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::CorruptCiphertext => DropboxError::CorruptCiphertext,
            other => DropboxError::Internal(other.to_string()),
        }
    }
}
