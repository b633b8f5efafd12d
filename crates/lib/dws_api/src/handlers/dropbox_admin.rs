//! Dropbox integration admin handlers. Super admin only.

use axum::extract::State;
use axum::{Extension, Json};
use dws_core::dropbox::manager::AuthorizeRequest;
use dws_core::models::auth::{Actor, ClientMeta};
use dws_core::models::dropbox::DropboxStatus;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::client::Client;
use crate::models::{
    DropboxAuthorizeRequest, DropboxAuthorizeResponse, DropboxCallbackRequest,
    DropboxCallbackResponse, DropboxRefreshResponse, MessageResponse,
};

fn actor(caller: &AuthenticatedUser, meta: ClientMeta) -> Actor {
    Actor {
        user_id: caller.user.id,
        meta,
    }
}

/// Request value, else the configured default.
fn redirect_uri(state: &AppState, requested: Option<String>) -> Option<String> {
    requested
        .filter(|uri| !uri.trim().is_empty())
        .or_else(|| state.config.dropbox_redirect_uri.clone())
}

/// `GET /admin/dropbox/status` — connection state without secrets.
pub async fn status_handler(State(state): State<AppState>) -> AppResult<Json<DropboxStatus>> {
    Ok(Json(state.dropbox.status().await?))
}

/// `POST /admin/dropbox/authorize` — build the provider authorization URL.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Json(body): Json<DropboxAuthorizeRequest>,
) -> AppResult<Json<DropboxAuthorizeResponse>> {
    let redirect = redirect_uri(&state, body.redirect_uri);
    let auth_url = state
        .dropbox
        .authorization_url(&body.app_key, redirect.as_deref())?;
    Ok(Json(DropboxAuthorizeResponse {
        auth_url,
        message: "Visit this URL to authorize Dropbox access, then submit the code to the callback endpoint".into(),
    }))
}

/// `POST /admin/dropbox/callback` — exchange the authorization code and
/// store the sealed credentials.
pub async fn callback_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(body): Json<DropboxCallbackRequest>,
) -> AppResult<Json<DropboxCallbackResponse>> {
    let request = AuthorizeRequest {
        redirect_uri: redirect_uri(&state, body.redirect_uri),
        app_key: body.app_key,
        app_secret: body.app_secret,
        code: body.code,
        parent_folder: body.parent_folder,
    };
    let status = state
        .dropbox
        .authorize(request, &actor(&caller, meta))
        .await?;
    info!(user_id = %caller.user.id, "dropbox authorized");
    Ok(Json(DropboxCallbackResponse {
        message: "Dropbox successfully authorized and configured".into(),
        status,
    }))
}

/// `POST /admin/dropbox/refresh` — refresh the access token now.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<DropboxRefreshResponse>> {
    let token_expiry = state
        .dropbox
        .force_refresh(&actor(&caller, meta))
        .await?;
    Ok(Json(DropboxRefreshResponse {
        message: "Token refresh successful".into(),
        token_expiry,
    }))
}

/// `POST /admin/dropbox/test` — probe the account with a fresh token.
///
/// A failed probe is reported in the body, not as an HTTP error.
pub async fn test_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Json<MessageResponse> {
    match state.dropbox.test(&actor(&caller, meta)).await {
        Ok(()) => Json(MessageResponse::ok("Dropbox connection is working correctly")),
        Err(e) => Json(MessageResponse {
            message: e.to_string(),
            success: false,
        }),
    }
}

/// `DELETE /admin/dropbox/configuration` — drop the stored configuration.
pub async fn delete_configuration_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<MessageResponse>> {
    state.dropbox.delete(&actor(&caller, meta)).await?;
    Ok(Json(MessageResponse::ok(
        "Dropbox configuration deleted successfully",
    )))
}
