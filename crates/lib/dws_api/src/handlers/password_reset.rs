//! Password reset request handlers.

use axum::Json;
use axum::extract::State;
use dws_core::reset::ResetError;
use tracing::debug;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::client::Client;
use crate::models::{
    ForgotPasswordRequest, MessageResponse, ResetPasswordRequest, ValidateResetCodeRequest,
    ValidateResetCodeResponse,
};

const FORGOT_ACK: &str = "If an account exists for this email, a reset code has been sent";

/// `POST /auth/forgot-password` — mail a reset code.
///
/// Unknown, inactive and rate-limited accounts get the same answer as a
/// successful request; the core still audits the distinct reason.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    match state.reset.request(&body.email, &meta).await {
        Ok(_) => {}
        Err(ResetError::UserNotFound | ResetError::UserInactive) => {
            debug!(ip = %meta.ip, "reset requested for an unusable account");
        }
        Err(ResetError::TooManyRequests) => {
            debug!(ip = %meta.ip, "reset request over the rate limit");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Json(MessageResponse::ok(FORGOT_ACK)))
}

/// `POST /auth/validate-reset-code` — trade the mailed code for the signed
/// reset token.
pub async fn validate_reset_code_handler(
    State(state): State<AppState>,
    Json(body): Json<ValidateResetCodeRequest>,
) -> AppResult<Json<ValidateResetCodeResponse>> {
    let token = state.reset.validate_code(&body.code).await?;
    Ok(Json(ValidateResetCodeResponse {
        token,
        message: "Code verified".into(),
        success: true,
    }))
}

/// `POST /auth/reset-password` — set a new password with the reset token.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Client(meta): Client,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .reset
        .reset(&body.token, &body.new_password, &meta)
        .await?;
    Ok(Json(MessageResponse::ok("Password has been reset successfully")))
}
