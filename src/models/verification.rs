use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_digest;

/// Verification request lifecycle.
///
/// `PENDING -> PROCESSING -> COMPLETED | FAILED`; nothing moves backwards
/// and the last two are terminal.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VerificationStatus {
    pub fn can_transition_to(self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VerificationStatus::Completed | VerificationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Processing => "PROCESSING",
            VerificationStatus::Completed => "COMPLETED",
            VerificationStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    ServiceVerification,
    AuthenticityCheck,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub id: i64,
    pub request_id: String,
    pub asset_id: i64,
    pub request_type: RequestType,
    pub provider_id: Option<String>,
    pub requested_by: String,
    pub status: VerificationStatus,
    pub blockchain_event_id: Option<i64>,
    pub tx_hash: Option<String>,
    pub data_hash: Option<String>,
    pub evidence_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// `VR-<unix millis>-<9 base36 chars>`
pub fn generate_request_id() -> String {
    const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("VR-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVerificationRequest {
    #[validate(range(min = 1))]
    pub asset_id: i64,
    pub request_type: RequestType,
    #[validate(length(max = 255))]
    pub provider_id: Option<String>,
}

/// Partial update of a verification request. Absent fields are left as
/// stored.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVerificationRequest {
    pub status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_event_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom = "validate_digest")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom = "validate_digest")]
    pub data_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UpdateVerificationRequest {
    fn status(status: VerificationStatus) -> Self {
        Self {
            status,
            blockchain_event_id: None,
            tx_hash: None,
            data_hash: None,
            evidence_id: None,
            error_message: None,
        }
    }

    pub fn processing() -> Self {
        Self::status(VerificationStatus::Processing)
    }

    pub fn completed(
        blockchain_event_id: i64,
        tx_hash: impl Into<String>,
        data_hash: impl Into<String>,
        evidence_id: i64,
    ) -> Self {
        Self {
            blockchain_event_id: Some(blockchain_event_id),
            tx_hash: Some(tx_hash.into()),
            data_hash: Some(data_hash.into()),
            evidence_id: Some(evidence_id),
            ..Self::status(VerificationStatus::Completed)
        }
    }

    pub fn failed(error_message: impl Into<String>, tx_hash: Option<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            tx_hash,
            ..Self::status(VerificationStatus::Failed)
        }
    }
}
