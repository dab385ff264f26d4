//! API handlers for the VeriPass record store

pub mod assets;
pub mod evidence;
pub mod service_records;
pub mod verification;

use axum::{http::StatusCode, Json};

use crate::models::{ApiResponse, Upsert};

pub use assets::*;
pub use evidence::*;
pub use service_records::*;
pub use verification::*;

/// 201 for a new row, 200 when an existing one satisfied the request
pub(crate) fn upsert_response<T>(result: Upsert<T>) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = if result.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::ok(result.into_inner())))
}

pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("OK"))
}
