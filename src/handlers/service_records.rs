use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::middleware::OracleKey;
use crate::models::{ApiResponse, CreateServiceRecordRequest, ServiceRecord};

pub async fn list_service_records(
    State(state): State<AppState>,
    _oracle: OracleKey,
    Path(asset_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<ServiceRecord>>>> {
    let records = state.service_record_service.list_by_asset(asset_id).await?;
    Ok(Json(ApiResponse::ok(records)))
}

pub async fn create_service_record(
    State(state): State<AppState>,
    _oracle: OracleKey,
    Json(payload): Json<CreateServiceRecordRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ServiceRecord>>)> {
    let record = state.service_record_service.create_record(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}
