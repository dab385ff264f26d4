//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::services::{AssetService, EvidenceService, ServiceRecordService, VerificationService};

/// Credentials the API checks
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Arc<str>,
    pub oracle_api_key: Arc<str>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub asset_service: Arc<AssetService>,
    pub evidence_service: Arc<EvidenceService>,
    pub verification_service: Arc<VerificationService>,
    pub service_record_service: Arc<ServiceRecordService>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, jwt_secret: &str, oracle_api_key: &str) -> Self {
        Self {
            asset_service: Arc::new(AssetService::new(db_pool.clone())),
            evidence_service: Arc::new(EvidenceService::new(db_pool.clone())),
            verification_service: Arc::new(VerificationService::new(db_pool.clone())),
            service_record_service: Arc::new(ServiceRecordService::new(db_pool)),
            auth: AuthConfig {
                jwt_secret: Arc::from(jwt_secret),
                oracle_api_key: Arc::from(oracle_api_key),
            },
        }
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<VerificationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.verification_service.clone()
    }
}
