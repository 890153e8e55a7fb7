//! Admin inventory endpoints.
//!
//! Mounted behind `require_admin`; handlers still pass the session's gate
//! into the inventory service, which rejects a closed gate on its own.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::invite_code::{
    AddCodesRequest, AddCodesResponse, ListCodesQuery, UpdateCodeStatusRequest,
};
use domain::models::{AdminCodeView, CodeUsage};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::AdminAuth;

#[derive(Debug, Serialize)]
pub struct DeleteCodeResponse {
    pub success: bool,
}

/// List codes, newest first, optionally filtered by status.
///
/// GET /api/admin/codes?status=
pub async fn list_codes(
    State(state): State<AppState>,
    auth: AdminAuth,
    Query(query): Query<ListCodesQuery>,
) -> Result<Json<Vec<AdminCodeView>>, ApiError> {
    let codes = state.inventory.list_codes(auth.gate(), query.status).await?;
    Ok(Json(codes))
}

/// Add codes in bulk. A duplicate anywhere rejects the whole batch.
///
/// POST /api/admin/codes
pub async fn add_codes(
    State(state): State<AppState>,
    auth: AdminAuth,
    Json(request): Json<AddCodesRequest>,
) -> Result<(StatusCode, Json<AddCodesResponse>), ApiError> {
    request.validate()?;

    let codes = state
        .inventory
        .add_codes(auth.gate(), &request.codes, request.max_uses)
        .await?;

    tracing::info!(
        admin = %auth.username,
        count = codes.len(),
        "Codes added to pool"
    );

    Ok((
        StatusCode::CREATED,
        Json(AddCodesResponse {
            success: true,
            count: codes.len(),
            codes,
        }),
    ))
}

/// GET /api/admin/codes/:code_id
pub async fn get_code(
    State(state): State<AppState>,
    auth: AdminAuth,
    Path(code_id): Path<Uuid>,
) -> Result<Json<AdminCodeView>, ApiError> {
    Ok(Json(state.inventory.get_code(auth.gate(), code_id).await?))
}

/// Overwrite a code's status.
///
/// PATCH /api/admin/codes/:code_id
pub async fn update_code_status(
    State(state): State<AppState>,
    auth: AdminAuth,
    Path(code_id): Path<Uuid>,
    Json(request): Json<UpdateCodeStatusRequest>,
) -> Result<Json<AdminCodeView>, ApiError> {
    let code = state
        .inventory
        .update_status(auth.gate(), code_id, request.status)
        .await?;

    tracing::info!(
        admin = %auth.username,
        code_id = %code_id,
        status = %request.status,
        "Code status changed"
    );
    Ok(Json(code))
}

/// Delete a code and its usage history.
///
/// DELETE /api/admin/codes/:code_id
pub async fn delete_code(
    State(state): State<AppState>,
    auth: AdminAuth,
    Path(code_id): Path<Uuid>,
) -> Result<Json<DeleteCodeResponse>, ApiError> {
    state.inventory.delete_code(auth.gate(), code_id).await?;

    tracing::info!(admin = %auth.username, code_id = %code_id, "Code deleted");
    Ok(Json(DeleteCodeResponse { success: true }))
}

/// Claims recorded against a code, newest first.
///
/// GET /api/admin/codes/:code_id/usages
pub async fn list_usages(
    State(state): State<AppState>,
    auth: AdminAuth,
    Path(code_id): Path<Uuid>,
) -> Result<Json<Vec<CodeUsage>>, ApiError> {
    Ok(Json(
        state.inventory.list_usages(auth.gate(), code_id).await?,
    ))
}
