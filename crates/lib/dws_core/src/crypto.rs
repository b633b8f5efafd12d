//! AES-256-GCM sealing for third-party secrets at rest.
//!
//! Seals Dropbox tokens, the Dropbox app secret and the SMTP password.
//! Uses random 12-byte nonces prepended to the ciphertext; the envelope is
//! base64(STANDARD) of `nonce || ciphertext || tag` for storage in TEXT
//! columns. The empty string seals to the empty string.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use thiserror::Error;
use tracing::warn;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
pub const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Crypto errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The sealed value is malformed, truncated, tampered with, or was sealed
    /// under a different key.
    #[error("corrupt ciphertext")]
    CorruptCiphertext,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Seal,
}

/// Process-wide sealing box holding the 256-bit key.
#[derive(Clone)]
pub struct CryptoBox {
    cipher: Aes256Gcm,
    ephemeral: bool,
}

impl std::fmt::Debug for CryptoBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoBox")
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl CryptoBox {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            ephemeral: false,
        }
    }

    /// Build from a base64-encoded 32-byte key (the `ENCRYPTION_KEY` format).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("base64 decode: {e}")))?;
        let key: [u8; KEY_SIZE] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    /// Random process-local key. Values sealed in earlier runs will not open.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        Self {
            ephemeral: true,
            ..Self::new(key)
        }
    }

    /// Key from the environment value if present, otherwise an ephemeral key
    /// with a loud warning.
    pub fn from_env_value(value: Option<&str>) -> Result<Self, CryptoError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(encoded) => Self::from_base64(encoded),
            None => {
                warn!(
                    "ENCRYPTION_KEY not set; using a random process-local key. \
                     Secrets sealed by earlier runs cannot be opened and must be re-entered"
                );
                Ok(Self::ephemeral())
            }
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Seal a UTF-8 secret.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Seal)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    /// Open a sealed value produced by [`CryptoBox::seal`].
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        if sealed.is_empty() {
            return Ok(String::new());
        }

        let combined = STANDARD
            .decode(sealed)
            .map_err(|_| CryptoError::CorruptCiphertext)?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::CorruptCiphertext);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::CorruptCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::CorruptCiphertext)
    }
}
