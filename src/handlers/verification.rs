use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::{AuthenticatedUser, OracleKey};
use crate::models::{
    ApiResponse, CreateVerificationRequest, UpdateVerificationRequest, VerificationRequest,
};

use super::upsert_response;

pub async fn create_verification_request(
    State(state): State<AppState>,
    AuthenticatedUser(address): AuthenticatedUser,
    Json(payload): Json<CreateVerificationRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<VerificationRequest>>)> {
    let request = state
        .verification_service
        .create_request(payload, &address)
        .await?;
    Ok(upsert_response(request))
}

pub async fn list_pending_requests(
    State(state): State<AppState>,
    _oracle: OracleKey,
) -> AppResult<Json<ApiResponse<Vec<VerificationRequest>>>> {
    let requests = state.verification_service.list_pending().await?;
    Ok(Json(ApiResponse::ok(requests)))
}

pub async fn get_verification_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<ApiResponse<VerificationRequest>>> {
    let request = state
        .verification_service
        .get_request(&request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Verification request not found"))?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn list_requests_by_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<VerificationRequest>>>> {
    let requests = state.verification_service.list_by_asset(asset_id).await?;
    Ok(Json(ApiResponse::ok(requests)))
}

pub async fn update_verification_request(
    State(state): State<AppState>,
    _oracle: OracleKey,
    Path(request_id): Path<String>,
    Json(payload): Json<UpdateVerificationRequest>,
) -> AppResult<Json<ApiResponse<VerificationRequest>>> {
    let request = state
        .verification_service
        .update_request(&request_id, payload)
        .await?;
    Ok(Json(ApiResponse::ok(request)))
}
