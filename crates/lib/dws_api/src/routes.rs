//! Route paths.

pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const POST_AUTH_CHANGE_PASSWORD: &str = "/auth/change-password";

pub const POST_AUTH_FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const POST_AUTH_VALIDATE_RESET_CODE: &str = "/auth/validate-reset-code";
pub const POST_AUTH_RESET_PASSWORD: &str = "/auth/reset-password";

pub const GET_ADMIN_DROPBOX_STATUS: &str = "/admin/dropbox/status";
pub const POST_ADMIN_DROPBOX_AUTHORIZE: &str = "/admin/dropbox/authorize";
pub const POST_ADMIN_DROPBOX_CALLBACK: &str = "/admin/dropbox/callback";
pub const POST_ADMIN_DROPBOX_REFRESH: &str = "/admin/dropbox/refresh";
pub const POST_ADMIN_DROPBOX_TEST: &str = "/admin/dropbox/test";
pub const DELETE_ADMIN_DROPBOX_CONFIGURATION: &str = "/admin/dropbox/configuration";

pub const ADMIN_SMTP: &str = "/admin/smtp";
