use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use validator::{Validate, ValidationError};

use super::{is_http_url, validate_date, validate_digest};

/// Lifecycle event types (must match the EventRegistry contract's enum)
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EventType {
    Maintenance,
    Verification,
    Warranty,
    Certification,
    Custom,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EvidenceStatus {
    /// Stored off-chain, not yet anchored
    Pending,
    /// Recorded on-chain
    Confirmed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvidenceFile {
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: i64,
    pub asset_id: i64,
    pub data_hash: String,
    pub event_type: EventType,
    pub event_date: String,
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub description: Option<String>,
    pub files: Json<Vec<EvidenceFile>>,
    pub metadata: Option<Json<Value>>,
    pub status: EvidenceStatus,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub blockchain_event_id: Option<i64>,
    pub tx_hash: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// The hashed field subset of an evidence record.
///
/// The oracle builds this to submit evidence and the store hashes the same
/// shape on create, so both sides arrive at the same digest. Attachments
/// (`files`) are presentation data and stay out of it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePayload {
    pub asset_id: i64,
    pub event_type: EventType,
    pub event_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl EvidencePayload {
    /// `metadata.verifiedBy`, set by the oracle on evidence it builds.
    pub fn verified_by(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("verifiedBy"))
            .and_then(Value::as_str)
    }
}

/// Request DTO for creating evidence
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvidenceRequest {
    #[validate(range(min = 1))]
    pub asset_id: i64,
    pub event_type: EventType,
    #[validate(custom = "validate_date")]
    pub event_date: String,
    #[validate(length(max = 255))]
    pub provider_id: Option<String>,
    #[validate(length(max = 255))]
    pub provider_name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_files")]
    pub files: Option<Vec<EvidenceFile>>,
    pub metadata: Option<Value>,
}

impl CreateEvidenceRequest {
    pub fn payload(&self) -> EvidencePayload {
        EvidencePayload {
            asset_id: self.asset_id,
            event_type: self.event_type,
            event_date: self.event_date.clone(),
            provider_id: self.provider_id.clone(),
            provider_name: self.provider_name.clone(),
            description: self.description.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl From<EvidencePayload> for CreateEvidenceRequest {
    fn from(payload: EvidencePayload) -> Self {
        Self {
            asset_id: payload.asset_id,
            event_type: payload.event_type,
            event_date: payload.event_date,
            provider_id: payload.provider_id,
            provider_name: payload.provider_name,
            description: payload.description,
            files: None,
            metadata: payload.metadata,
        }
    }
}

fn validate_files(files: &[EvidenceFile]) -> Result<(), ValidationError> {
    let valid = files
        .iter()
        .all(|file| is_http_url(&file.url) && !file.name.is_empty() && !file.file_type.is_empty());
    if valid {
        Ok(())
    } else {
        let mut error = ValidationError::new("files");
        error.message = Some("each file needs an http(s) url, a type and a name".into());
        Err(error)
    }
}

/// Request DTO for anchoring evidence that the owner recorded on-chain
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEvidenceRequest {
    #[validate(custom = "validate_digest")]
    pub tx_hash: String,
    pub blockchain_event_id: Option<i64>,
}

/// What the oracle needs back after creating evidence
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvidence {
    pub id: i64,
    pub data_hash: String,
}

impl From<&Evidence> for CreatedEvidence {
    fn from(evidence: &Evidence) -> Self {
        Self {
            id: evidence.id,
            data_hash: evidence.data_hash.clone(),
        }
    }
}
