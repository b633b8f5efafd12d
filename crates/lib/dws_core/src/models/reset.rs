//! Password reset models.

use chrono::{DateTime, Utc};

use crate::id::Id;

/// A password reset ticket: a short code exchanged for a signed token.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ResetTicket {
    pub id: Id,
    pub user_id: Id,
    /// `TokenMint` output with purpose `password_reset`.
    pub signed_token: String,
    /// Six decimal digits.
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl ResetTicket {
    /// Consumable only while `now < expires_at` and not yet used.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}
