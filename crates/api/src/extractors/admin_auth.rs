//! Admin session extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::{authenticate, AdminAuth, UNAUTHORIZED_MESSAGE};

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // First, check if auth info was already inserted by middleware
        if let Some(auth) = parts.extensions.get::<AdminAuth>() {
            return Ok(auth.clone());
        }

        authenticate(state, &parts.headers)
            .await
            .ok_or_else(|| ApiError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()))
    }
}

/// Admin session if the request carries a valid token, `None` otherwise.
#[derive(Debug, Clone)]
pub struct OptionalAdminAuth(pub Option<AdminAuth>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalAdminAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<AdminAuth>() {
            return Ok(OptionalAdminAuth(Some(auth.clone())));
        }
        Ok(OptionalAdminAuth(
            authenticate(state, &parts.headers).await,
        ))
    }
}
