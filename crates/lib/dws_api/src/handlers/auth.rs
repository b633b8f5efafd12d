//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::client::Client;
use crate::models::{
    ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest, TokenResponse, UserInfo,
};

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let result = state.auth.login(&body.email, &body.password, &meta).await?;
    Ok(Json(result.into()))
}

/// `POST /auth/refresh` — exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let result = state.auth.refresh(&body.refresh_token, &meta).await?;
    Ok(Json(result.into()))
}

/// `POST /auth/logout` — end the session behind the presented bearer.
pub async fn logout_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .logout(&caller.bearer, caller.user.id, &meta)
        .await?;
    Ok(Json(MessageResponse::ok("Logged out successfully")))
}

/// `GET /auth/me` — the authenticated user.
pub async fn me_handler(Extension(caller): Extension<AuthenticatedUser>) -> Json<UserInfo> {
    Json(UserInfo::from(&caller.user))
}

/// `POST /auth/change-password` — replace the password after checking the
/// current one.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .change_password(
            caller.user.id,
            &body.current_password,
            &body.new_password,
            &meta,
        )
        .await?;
    Ok(Json(MessageResponse::ok("Password changed successfully")))
}
