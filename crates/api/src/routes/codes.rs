//! Public invite code endpoints.

use axum::{extract::State, Json};
use domain::models::code_usage::{
    ClaimResponse, FeedbackRequest, FeedbackResponse, MarkUsedRequest,
};
use domain::models::invite_code::{ContributeCodeRequest, ContributeCodeResponse};
use domain::models::CodeStatistics;
use serde::Serialize;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

/// Response for `POST /api/codes/mark-used`.
#[derive(Debug, Serialize)]
pub struct MarkUsedResponse {
    pub success: bool,
}

/// Pool statistics.
///
/// GET /api/codes/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<CodeStatistics>, ApiError> {
    Ok(Json(state.contribution.statistics().await?))
}

/// Hand out the next claimable code.
///
/// POST /api/codes/request
pub async fn request_code(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<ClaimResponse>, ApiError> {
    let claim = state.allocation.claim(&caller).await?;
    Ok(Json(ClaimResponse::from(&claim)))
}

/// Add a code to the pool.
///
/// POST /api/codes/contribute
pub async fn contribute_code(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<ContributeCodeRequest>,
) -> Result<Json<ContributeCodeResponse>, ApiError> {
    request.validate()?;

    let contribution = state.contribution.contribute(&request.code, &caller).await?;
    let message = if contribution.attributed_usage.is_some() {
        "Thank you for giving back! Your code is now in the pool."
    } else {
        "Thank you for contributing! Your code is now in the pool."
    };

    Ok(Json(ContributeCodeResponse {
        success: true,
        code: contribution.code.code,
        message: message.to_string(),
    }))
}

/// Report whether a claimed code worked. A not-working report gets a
/// replacement code when the pool has one.
///
/// POST /api/codes/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    request.validate()?;

    let outcome = state
        .allocation
        .submit_feedback(
            request.usage_id,
            request.working,
            request.note.as_deref(),
            &caller,
        )
        .await?;

    Ok(Json(FeedbackResponse {
        success: true,
        replaced: outcome.replaced,
        new_code: outcome.replacement.as_ref().map(ClaimResponse::from),
        message: outcome.message,
    }))
}

/// Self-report that a claimed code was used.
///
/// POST /api/codes/mark-used
pub async fn mark_used(
    State(state): State<AppState>,
    Json(request): Json<MarkUsedRequest>,
) -> Result<Json<MarkUsedResponse>, ApiError> {
    state.allocation.mark_used(request.usage_id).await?;
    Ok(Json(MarkUsedResponse { success: true }))
}
