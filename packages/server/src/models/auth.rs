use common::Role;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Request body for login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ana.pop@example.ro")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    pub role: Role,
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "Ana Pop")]
    pub name: String,
}

/// Current session.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "ana.pop@example.ro")]
    pub email: String,
    #[schema(example = "Ana Pop")]
    pub name: String,
    pub role: Role,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PasswordResetRequest {
    #[schema(example = "ana.pop@example.ro")]
    pub email: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PasswordResetConfirmRequest {
    /// Token received through the reset link.
    pub token: String,
    /// New password (8-128 characters).
    pub new_password: String,
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

/// Generic acknowledgement that does not reveal whether anything happened.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AcceptedResponse {
    #[schema(example = "If the address is registered, a reset link has been sent")]
    pub message: String,
}
