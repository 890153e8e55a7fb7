use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::InviteError;
use serde::Serialize;
use thiserror::Error;

/// Message returned when the pool has nothing left to hand out.
pub const NO_CODES_MESSAGE: &str = "No codes available at this time. Please check back later.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate code: {0}")]
    DuplicateCode(String),

    #[error("No codes available")]
    NoCodesAvailable,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited { retry_after: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::DuplicateCode(msg) => (StatusCode::BAD_REQUEST, "duplicate_code", msg.clone()),
            ApiError::NoCodesAvailable => (
                StatusCode::NOT_FOUND,
                "no_codes_available",
                NO_CODES_MESSAGE.into(),
            ),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests. Please try again later.".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details: None,
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        if err.is_expected() {
            tracing::debug!(error = %err, "Request ended with a domain outcome");
        } else {
            tracing::warn!(error = %err, "Store operation failed");
        }

        match err {
            InviteError::NotFound(_) => ApiError::NotFound(err.to_string()),
            InviteError::DuplicateCode(_) => ApiError::DuplicateCode(err.to_string()),
            InviteError::NoCodesAvailable => ApiError::NoCodesAvailable,
            InviteError::Unauthorized => ApiError::Unauthorized("Authentication required".into()),
            InviteError::Validation(msg) => ApiError::Validation(msg),
            InviteError::Transaction(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation(message)
    }
}
