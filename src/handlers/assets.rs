use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::hash::is_digest;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    ApiResponse, Asset, CreateAssetRequest, ListAssetsQuery, UpdateMintStatusRequest,
};

use super::upsert_response;

pub async fn create_asset(
    State(state): State<AppState>,
    AuthenticatedUser(address): AuthenticatedUser,
    Json(payload): Json<CreateAssetRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Asset>>)> {
    let asset = state.asset_service.create_asset(payload, &address).await?;
    Ok(upsert_response(asset))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<ListAssetsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Asset>>>> {
    let assets = state.asset_service.list_assets(query).await?;
    Ok(Json(ApiResponse::ok(assets)))
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Asset>>> {
    let asset = state
        .asset_service
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::not_found("Asset not found"))?;
    Ok(Json(ApiResponse::ok(asset)))
}

pub async fn get_asset_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> AppResult<Json<ApiResponse<Asset>>> {
    if !is_digest(&hash) {
        return Err(AppError::validation("hash must be 0x followed by 64 hex characters"));
    }
    let asset = state
        .asset_service
        .get_asset_by_hash(&hash)
        .await?
        .ok_or_else(|| AppError::not_found("Asset not found"))?;
    Ok(Json(ApiResponse::ok(asset)))
}

pub async fn update_mint_status(
    State(state): State<AppState>,
    AuthenticatedUser(address): AuthenticatedUser,
    Path(asset_id): Path<i64>,
    Json(payload): Json<UpdateMintStatusRequest>,
) -> AppResult<Json<ApiResponse<Asset>>> {
    let asset = state
        .asset_service
        .update_mint_status(asset_id, &address, payload)
        .await?;
    Ok(Json(ApiResponse::ok(asset)))
}
