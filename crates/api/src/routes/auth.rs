//! Admin login and session check.

use axum::{extract::State, Json};
use domain::models::admin::{AdminCheckResponse, AdminLoginRequest, AdminLoginResponse};
use domain::services::AdminRepository;
use shared::password::verify_password;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OptionalAdminAuth;

/// Same message for unknown usernames and wrong passwords.
const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Exchange admin credentials for a session token.
///
/// POST /api/admin/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<AdminLoginResponse>, ApiError> {
    request.validate()?;

    let admin = state
        .store
        .find_admin_by_username(request.username.trim())
        .await?
        .ok_or_else(|| {
            tracing::info!("Admin login failed: unknown username");
            ApiError::Unauthorized(INVALID_CREDENTIALS.to_string())
        })?;

    let valid = verify_password(&request.password, &admin.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {}", e)))?;
    if !valid {
        tracing::info!(admin_id = %admin.id, "Admin login failed: wrong password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let (token, jti) = state
        .tokens
        .issue(admin.id, &admin.username)
        .map_err(|e| ApiError::Internal(format!("Failed to issue admin token: {}", e)))?;

    tracing::info!(admin_id = %admin.id, jti = %jti, "Admin logged in");

    Ok(Json(AdminLoginResponse {
        success: true,
        token,
        expires_in: state.tokens.expiry_secs,
    }))
}

/// Report whether the request carries a valid admin session. Never fails.
///
/// GET /api/admin/check
pub async fn check(OptionalAdminAuth(auth): OptionalAdminAuth) -> Json<AdminCheckResponse> {
    Json(AdminCheckResponse {
        authenticated: auth.is_some(),
    })
}
