use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{password_reset, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{
    AcceptedResponse, LoginRequest, LoginResponse, MeResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, validate_login_request, validate_new_password,
};
use crate::services::account::normalize_email;
use crate::state::AppState;
use crate::utils::{hash, jwt};

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in with email and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong email or password (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let email = normalize_email(&payload.email);

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let is_valid = hash::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;

    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt::sign(
        user.id,
        &user.email,
        user.role,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_hours,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    Ok(Json(LoginResponse {
        token,
        role: user.role,
        user_id: user.id,
        name: user.name,
    }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current session",
    responses(
        (status = 200, description = "Session details", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, AppError> {
    // The token may outlive the account.
    let user = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        name: user.name,
        role: user.role,
    }))
}

#[utoipa::path(
    post,
    path = "/password-reset",
    tag = "Auth",
    operation_id = "requestPasswordReset",
    summary = "Request a password reset link",
    description = "Always answers 202 with the same message, whether or not the address is registered.",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Request accepted", body = AcceptedResponse),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    AppJson(payload): AppJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !payload.email.trim().is_empty() {
        state
            .accounts
            .request_password_reset(
                &payload.email,
                &state.config.auth.password_reset_redirect_url,
            )
            .await?;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "If the address is registered, a reset link has been sent".into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/password-reset/confirm",
    tag = "Auth",
    operation_id = "confirmPasswordReset",
    summary = "Set a new password with a reset token",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Token invalid, expired or used, or weak password (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    AppJson(payload): AppJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_new_password(&payload.new_password)?;

    let invalid = || AppError::Validation("Reset token is invalid or expired".into());
    let digest = hash::token_digest(payload.token.trim());

    let txn = state.db.begin().await?;

    let reset = password_reset::Entity::find()
        .filter(password_reset::Column::TokenDigest.eq(&digest))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(invalid)?;

    let now = Utc::now();
    if reset.used_at.is_some() || reset.expires_at <= now {
        return Err(invalid());
    }

    let password_hash = hash::hash_password(&payload.new_password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    user::Entity::update_many()
        .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
        .filter(user::Column::Id.eq(reset.user_id))
        .exec(&txn)
        .await?;

    let user_id = reset.user_id;
    let mut active = reset.into_active_model();
    active.used_at = Set(Some(now));
    active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id, "Password reset completed");
    Ok(StatusCode::NO_CONTENT)
}
