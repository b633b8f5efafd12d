//! Signed bearer assertions (HS256 JWTs).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore, rng};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::clock::Clock;
use crate::models::auth::{ExtraClaims, Purpose, TokenClaims};

/// Mints and verifies HS256 assertions with a process-wide secret.
///
/// Only HS256 is accepted on verification. Expiry is checked against the
/// injected [`Clock`]; a token whose `exp` equals "now" is already expired.
pub struct TokenMint {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenMint {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
        }
    }

    /// Issue a token for `sub`. Returns the token and its expiry.
    pub fn issue(
        &self,
        sub: &str,
        purpose: Purpose,
        ttl: Duration,
        extra: ExtraClaims,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::Internal(format!("token ttl: {e}")))?;
        let expires_at = now + ttl;

        let mut jti = [0u8; 16];
        rng().fill_bytes(&mut jti);

        let claims = TokenClaims {
            sub: sub.to_string(),
            purpose,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: URL_SAFE_NO_PAD.encode(jti),
            role: extra.role,
            admin_level: extra.admin_level,
            email: extra.email,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok((token, expires_at))
    }

    /// Verify signature, algorithm and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Verify and additionally require a specific purpose.
    pub fn verify_purpose(&self, token: &str, purpose: Purpose) -> Result<TokenClaims, AuthError> {
        let claims = self.verify(token)?;
        if claims.purpose != purpose {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    let from_env = std::env::var("JWT_SECRET").ok();
    resolve_jwt_secret_at(from_env.as_deref(), &jwt_secret_path())
}

/// Use `configured` when non-empty; otherwise reuse or generate the secret
/// persisted at `path`.
pub fn resolve_jwt_secret_at(configured: Option<&str>, path: &Path) -> String {
    if let Some(secret) = configured
        && !secret.trim().is_empty()
    {
        return secret.trim().to_string();
    }
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(error = %e, "could not create JWT secret directory");
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(error = %e, "could not persist generated JWT secret; sessions will not survive a restart"),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doctors-workspace")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::auth::Role;

    const SECRET: &[u8] = b"test-secret-for-token-mint";

    fn mint() -> (TokenMint, ManualClock) {
        let clock = ManualClock::starting_now();
        (TokenMint::new(SECRET, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn issue_and_verify() {
        let (mint, _) = mint();
        let extra = ExtraClaims {
            role: Some(Role::Physician),
            email: Some("alice@x.io".into()),
            ..Default::default()
        };
        let (token, _) = mint
            .issue("user-1", Purpose::Session, Duration::from_secs(60), extra)
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = mint.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.purpose, Purpose::Session);
        assert_eq!(claims.role, Some(Role::Physician));
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn same_second_tokens_differ() {
        let (mint, _) = mint();
        let ttl = Duration::from_secs(60);
        let (a, _) = mint.issue("u", Purpose::Session, ttl, ExtraClaims::default()).unwrap();
        let (b, _) = mint.issue("u", Purpose::Session, ttl, ExtraClaims::default()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn exp_equal_to_now_is_expired() {
        let (mint, clock) = mint();
        let (token, expires_at) = mint
            .issue("u", Purpose::Session, Duration::from_secs(60), ExtraClaims::default())
            .unwrap();
        clock.set(DateTime::from_timestamp(expires_at.timestamp(), 0).unwrap());
        assert!(matches!(mint.verify(&token), Err(AuthError::InvalidToken)));

        clock.advance(chrono::Duration::seconds(-1));
        assert!(mint.verify(&token).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (mint, clock) = mint();
        let (token, _) = mint
            .issue("u", Purpose::Session, Duration::from_secs(60), ExtraClaims::default())
            .unwrap();
        let other = TokenMint::new(b"another-secret", Arc::new(clock));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn none_algorithm_is_rejected() {
        let (mint, clock) = mint();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "sub": "u",
                "purpose": "session",
                "iat": clock.now().timestamp(),
                "exp": clock.now().timestamp() + 3600,
                "jti": "x",
            })
            .to_string(),
        );
        let forged = format!("{header}.{payload}.");
        assert!(matches!(mint.verify(&forged), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn other_hmac_algorithm_is_rejected() {
        let (mint, clock) = mint();
        let claims = serde_json::json!({
            "sub": "u",
            "purpose": "session",
            "iat": clock.now().timestamp(),
            "exp": clock.now().timestamp() + 3600,
            "jti": "x",
        });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(mint.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn purpose_is_enforced() {
        let (mint, _) = mint();
        let (token, _) = mint
            .issue("u", Purpose::PasswordReset, Duration::from_secs(60), ExtraClaims::default())
            .unwrap();
        assert!(mint.verify_purpose(&token, Purpose::PasswordReset).is_ok());
        assert!(matches!(
            mint.verify_purpose(&token, Purpose::Session),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn secret_is_generated_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jwt-secret");

        let first = resolve_jwt_secret_at(None, &path);
        assert_eq!(first.len(), 64);
        assert_eq!(resolve_jwt_secret_at(Some(""), &path), first);
        assert_eq!(resolve_jwt_secret_at(Some("configured"), &path), "configured");
    }
}
