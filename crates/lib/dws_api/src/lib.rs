//! # dws_api
//!
//! HTTP API library for Doctor's Workspace: authentication, password reset
//! and the super admin surface for Dropbox and SMTP settings.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use dws_core::auth::service::AuthCore;
use dws_core::dropbox::manager::TokenManager;
use dws_core::mail::smtp::SmtpSettings;
use dws_core::reset::flow::ResetFlow;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, dropbox_admin, password_reset, smtp};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthCore>,
    pub reset: Arc<ResetFlow>,
    pub dropbox: Arc<TokenManager>,
    pub smtp: Arc<SmtpSettings>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(
            routes::POST_AUTH_FORGOT_PASSWORD,
            post(password_reset::forgot_password_handler),
        )
        .route(
            routes::POST_AUTH_VALIDATE_RESET_CODE,
            post(password_reset::validate_reset_code_handler),
        )
        .route(
            routes::POST_AUTH_RESET_PASSWORD,
            post(password_reset::reset_password_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(
            routes::POST_AUTH_CHANGE_PASSWORD,
            post(auth::change_password_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Super admin routes; the last layer added runs first.
    let admin = Router::new()
        .route(
            routes::GET_ADMIN_DROPBOX_STATUS,
            get(dropbox_admin::status_handler),
        )
        .route(
            routes::POST_ADMIN_DROPBOX_AUTHORIZE,
            post(dropbox_admin::authorize_handler),
        )
        .route(
            routes::POST_ADMIN_DROPBOX_CALLBACK,
            post(dropbox_admin::callback_handler),
        )
        .route(
            routes::POST_ADMIN_DROPBOX_REFRESH,
            post(dropbox_admin::refresh_handler),
        )
        .route(
            routes::POST_ADMIN_DROPBOX_TEST,
            post(dropbox_admin::test_handler),
        )
        .route(
            routes::DELETE_ADMIN_DROPBOX_CONFIGURATION,
            delete(dropbox_admin::delete_configuration_handler),
        )
        .route(
            routes::ADMIN_SMTP,
            get(smtp::get_smtp_handler).put(smtp::update_smtp_handler),
        )
        .layer(axum::middleware::from_fn(
            middleware::auth::require_super_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
