use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use validator::Validate;

use super::validate_date;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    RoutineMaintenance,
    Repair,
    Inspection,
    Replacement,
}

/// Service/maintenance record held by a provider; the oracle's input
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: i64,
    pub record_id: String,
    pub asset_id: i64,
    pub provider_id: String,
    pub service_type: ServiceType,
    pub service_date: String,
    pub technician: Option<String>,
    pub work_performed: Json<Vec<String>>,
    pub notes: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRecordRequest {
    #[validate(length(min = 1, max = 255))]
    pub record_id: String,
    #[validate(range(min = 1))]
    pub asset_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub provider_id: String,
    pub service_type: ServiceType,
    #[validate(custom = "validate_date")]
    pub service_date: String,
    #[validate(length(max = 255))]
    pub technician: Option<String>,
    pub work_performed: Option<Vec<String>>,
    pub notes: Option<String>,
    pub verified: Option<bool>,
}
