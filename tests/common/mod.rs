#![allow(dead_code)]

use chrono::Duration;
use sqlx::SqlitePool;

use veripass_server::app_state::AppState;
use veripass_server::auth::generate_access_token;
use veripass_server::db;
use veripass_server::models::{
    Asset, CreateAssetRequest, CreateServiceRecordRequest, ServiceType,
};

pub const JWT_SECRET: &str = "test-jwt-secret-0123456789abcdefghij";
pub const ORACLE_KEY: &str = "test-oracle-key-0123456789abcdefghij";

pub const OWNER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const OTHER: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";

/// Hardhat account #0
pub const ORACLE_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ORACLE_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

pub async fn memory_pool() -> SqlitePool {
    db::connect("sqlite::memory:").await.unwrap()
}

pub async fn app_state() -> AppState {
    AppState::new(memory_pool().await, JWT_SECRET, ORACLE_KEY)
}

pub fn token(address: &str) -> String {
    generate_access_token(address, JWT_SECRET, Duration::hours(1)).unwrap()
}

pub fn asset_request(asset_id: i64) -> CreateAssetRequest {
    CreateAssetRequest {
        asset_id,
        manufacturer: "Rolex".to_string(),
        model: "Submariner".to_string(),
        serial_number: format!("SN-{asset_id}"),
        manufactured_date: "2021-06-15".to_string(),
        description: Some("Stainless steel diver".to_string()),
        images: Some(vec!["https://img.example.com/front.jpg".to_string()]),
        metadata: None,
    }
}

pub async fn seed_asset(state: &AppState, asset_id: i64) -> Asset {
    state
        .asset_service
        .create_asset(asset_request(asset_id), OWNER)
        .await
        .unwrap()
        .into_inner()
}

pub fn service_record(asset_id: i64, record_id: &str, verified: bool) -> CreateServiceRecordRequest {
    CreateServiceRecordRequest {
        record_id: record_id.to_string(),
        asset_id,
        provider_id: "provider-1".to_string(),
        service_type: ServiceType::RoutineMaintenance,
        service_date: "2024-03-01".to_string(),
        technician: Some("J. Doe".to_string()),
        work_performed: Some(vec!["Cleaned movement".to_string()]),
        notes: None,
        verified: Some(verified),
    }
}
