//! Request handlers.

pub mod auth;
pub mod dropbox_admin;
pub mod password_reset;
pub mod smtp;
