//! Domain models shared across the core and the HTTP layer.

pub mod audit;
pub mod auth;
pub mod dropbox;
pub mod mail;
pub mod reset;
