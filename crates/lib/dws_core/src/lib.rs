//! # dws_core
//!
//! Integration core for Doctor's Workspace: authentication and sessions,
//! the password reset protocol, at-rest sealing of third-party secrets, the
//! Dropbox OAuth token lifecycle and the background tasks that keep it
//! fresh.

pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod crypto;
pub mod db;
pub mod dropbox;
pub mod housekeeping;
pub mod id;
pub mod mail;
pub mod memory;
pub mod models;
pub mod reset;
pub mod scheduler;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
