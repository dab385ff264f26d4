//! Route definitions for the VeriPass API

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::*;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(asset_routes())
        .merge(evidence_routes())
        .merge(verification_routes())
        .merge(service_record_routes())
        .with_state(state)
}

// Asset routes
pub fn asset_routes() -> Router<AppState> {
    Router::new()
        .route("/api/assets", post(create_asset).get(list_assets))
        .route("/api/assets/hash/:hash", get(get_asset_by_hash))
        .route("/api/assets/:assetId", get(get_asset))
        .route("/api/assets/:assetId/mint-status", patch(update_mint_status))
}

// Evidence routes
pub fn evidence_routes() -> Router<AppState> {
    Router::new()
        .route("/api/evidence", post(create_evidence))
        .route("/api/evidence/hash/:hash", get(get_evidence_by_hash))
        .route("/api/evidence/asset/:assetId", get(list_evidence_by_asset))
        .route("/api/evidence/:id/confirm", patch(confirm_evidence))
}

// Verification request routes
pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/verification-requests", post(create_verification_request))
        .route("/api/verification-requests/pending", get(list_pending_requests))
        .route(
            "/api/verification-requests/asset/:assetId",
            get(list_requests_by_asset),
        )
        .route(
            "/api/verification-requests/:requestId",
            get(get_verification_request).patch(update_verification_request),
        )
}

// Service record routes (oracle only)
pub fn service_record_routes() -> Router<AppState> {
    Router::new()
        .route("/api/service-records", post(create_service_record))
        .route("/api/service-records/:assetId", get(list_service_records))
}
