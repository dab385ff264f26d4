use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::hash::is_digest;
use crate::middleware::{AuthenticatedCaller, AuthenticatedUser};
use crate::models::{ApiResponse, ConfirmEvidenceRequest, CreateEvidenceRequest, Evidence};

use super::upsert_response;

pub async fn create_evidence(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(payload): Json<CreateEvidenceRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Evidence>>)> {
    let evidence = state.evidence_service.create_evidence(payload, &caller).await?;
    Ok(upsert_response(evidence))
}

pub async fn get_evidence_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> AppResult<Json<ApiResponse<Evidence>>> {
    if !is_digest(&hash) {
        return Err(AppError::validation("hash must be 0x followed by 64 hex characters"));
    }
    let evidence = state
        .evidence_service
        .get_evidence_by_hash(&hash)
        .await?
        .ok_or_else(|| AppError::not_found("Evidence not found"))?;
    Ok(Json(ApiResponse::ok(evidence)))
}

pub async fn list_evidence_by_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<Evidence>>>> {
    let evidence = state.evidence_service.list_by_asset(asset_id).await?;
    Ok(Json(ApiResponse::ok(evidence)))
}

pub async fn confirm_evidence(
    State(state): State<AppState>,
    AuthenticatedUser(_address): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<ConfirmEvidenceRequest>,
) -> AppResult<Json<ApiResponse<Evidence>>> {
    let evidence = state.evidence_service.confirm_evidence(id, payload).await?;
    Ok(Json(ApiResponse::ok(evidence)))
}
