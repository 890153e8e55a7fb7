//! Admin session authentication middleware.
//!
//! Admin routes require `Authorization: Bearer <token>` carrying a session
//! token issued by `/api/admin/login`. The token must validate and the admin
//! it names must still exist.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::AdminGate;
use domain::services::AdminRepository;
use shared::jwt::extract_admin_id;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Uniform message for every admin authentication failure.
pub const UNAUTHORIZED_MESSAGE: &str = "Admin authentication required";

/// Authenticated admin, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub admin_id: Uuid,
    pub username: String,
    /// Token ID (jti) of the session.
    pub jti: String,
}

impl AdminAuth {
    pub fn gate(&self) -> AdminGate {
        AdminGate::granted()
    }
}

/// Returns the bearer token from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validates the session token in `headers` against the signing key and the
/// admin table. Any failure yields `None`.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<AdminAuth> {
    let token = bearer_token(headers)?;

    let claims = match state.tokens.validate(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Admin token validation failed: {}", e);
            return None;
        }
    };
    let admin_id = extract_admin_id(&claims).ok()?;

    match state.store.find_admin_by_id(admin_id).await {
        Ok(Some(admin)) => Some(AdminAuth {
            admin_id: admin.id,
            username: admin.username,
            jti: claims.jti,
        }),
        Ok(None) => {
            tracing::debug!(admin_id = %admin_id, "Token names an unknown admin");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up admin");
            None
        }
    }
}

/// Middleware for admin-only routes.
///
/// Rejects the request with a uniform 401 unless the bearer token is valid.
/// Authenticated admin information is stored in request extensions.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, req.headers()).await {
        Some(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        None => ApiError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()).into_response(),
    }
}
