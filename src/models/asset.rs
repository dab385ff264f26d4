use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use validator::Validate;

use super::{validate_date, validate_digest, validate_urls, PaginationParams};

/// Mint status of an asset passport
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MintStatus {
    Pending,
    Minted,
    Failed,
}

/// Physical asset, keyed by the ledger token id
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub asset_id: i64,
    pub data_hash: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub manufactured_date: String,
    pub description: Option<String>,
    pub images: Json<Vec<String>>,
    pub metadata: Option<Json<Value>>,
    pub mint_status: MintStatus,
    pub created_by: String,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub minted_at: Option<DateTime<Utc>>,
}

/// Request DTO for creating (or retrying) an asset
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    #[validate(range(min = 1))]
    pub asset_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub manufacturer: String,
    #[validate(length(min = 1, max = 255))]
    pub model: String,
    #[validate(length(min = 1, max = 255))]
    pub serial_number: String,
    #[validate(custom = "validate_date")]
    pub manufactured_date: String,
    pub description: Option<String>,
    #[validate(custom = "validate_urls")]
    pub images: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

/// The metadata subset that goes into an asset's data hash. The asset id is
/// part of it so identical metadata under two ids never collides.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHashInput<'a> {
    pub asset_id: i64,
    pub manufacturer: &'a str,
    pub model: &'a str,
    pub serial_number: &'a str,
    pub manufactured_date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

impl CreateAssetRequest {
    pub fn hash_input(&self) -> AssetHashInput<'_> {
        AssetHashInput {
            asset_id: self.asset_id,
            manufacturer: &self.manufacturer,
            model: &self.model,
            serial_number: &self.serial_number,
            manufactured_date: &self.manufactured_date,
            description: self.description.as_deref(),
        }
    }
}

/// Request DTO for a mint status transition
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMintStatusRequest {
    pub status: MintStatus,
    #[validate(custom = "validate_digest")]
    pub tx_hash: Option<String>,
}

/// Query parameters for listing assets
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAssetsQuery {
    pub created_by: Option<String>,
    pub status: Option<MintStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListAssetsQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
    }
}
