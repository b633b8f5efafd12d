//! SMTP relay settings handlers. Super admin only.

use axum::extract::State;
use axum::{Extension, Json};
use dws_core::models::auth::Actor;
use dws_core::models::mail::{SmtpStatus, SmtpUpdate};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::client::Client;

/// `GET /admin/smtp` — current settings without the password.
pub async fn get_smtp_handler(State(state): State<AppState>) -> AppResult<Json<SmtpStatus>> {
    Ok(Json(state.smtp.get().await?))
}

/// `PUT /admin/smtp` — replace the settings. Omitting `password` keeps the
/// stored one.
pub async fn update_smtp_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(body): Json<SmtpUpdate>,
) -> AppResult<Json<SmtpStatus>> {
    let actor = Actor {
        user_id: caller.user.id,
        meta,
    };
    Ok(Json(state.smtp.update(body, &actor).await?))
}
