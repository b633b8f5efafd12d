//! Authentication middleware: Bearer token extraction, session resolution
//! and the super admin guard.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dws_core::models::auth::User;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// The caller resolved from the bearer, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    /// Raw bearer, needed to end this session on logout.
    pub bearer: String,
}

fn bearer_from(request: &Request) -> Result<String, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;
    Ok(token.to_string())
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, resolves it to
/// a live session and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = bearer_from(&request)?;
    let user = state.auth.user_from_bearer(&bearer).await?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, bearer });

    Ok(next.run(request).await)
}

/// Axum middleware: lets only super admins through. Must run inside
/// [`require_auth`].
pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let caller = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    if !caller.user.is_super_admin() {
        debug!(user_id = %caller.user.id, path = %request.uri().path(), "super admin required");
        return Err(AppError::Forbidden("Insufficient permissions".into()));
    }

    Ok(next.run(request).await)
}
