//! Takes one verification request from claim to its final status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use super::gateway::{BackendGateway, GatewayError};
use super::ledger::{LedgerClient, LedgerError, SubmittedEvent};
use super::wallet::{OracleWallet, WalletError};
use crate::hash::{calculate_hash, parse_digest, HashError};
use crate::models::{
    CreatedEvidence, EventType, EvidencePayload, ServiceRecord, UpdateVerificationRequest,
    VerificationRequest,
};

pub const EVIDENCE_DESCRIPTION: &str = "Oracle verified service records";
const PERSIST_ATTEMPTS: u32 = 3;
const DEFAULT_PERSIST_BACKOFF: Duration = Duration::from_millis(500);

/// Why a request could not be verified. The message is what gets stored
/// as the request's errorMessage.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("No service records found")]
    NoServiceRecords,

    #[error("Service records validation failed")]
    ValidationFailed,

    #[error("Asset id {0} cannot be recorded on-chain")]
    InvalidAssetId(i64),

    #[error("Record store request failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Ledger submission failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Evidence hash error: {0}")]
    Hash(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] WalletError),
}

impl From<HashError> for VerifierError {
    fn from(error: HashError) -> Self {
        VerifierError::Hash(error.to_string())
    }
}

impl VerifierError {
    fn broadcast_tx_hash(&self) -> Option<String> {
        match self {
            VerifierError::Ledger(ledger) => ledger.broadcast_tx_hash().map(str::to_string),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Completed {
        tx_hash: String,
        event_id: u64,
        evidence_id: i64,
    },
    Failed {
        reason: String,
    },
    /// Claim failed; the request was left as it was
    Skipped {
        reason: String,
    },
}

pub struct Verifier {
    gateway: Arc<dyn BackendGateway>,
    ledger: Arc<dyn LedgerClient>,
    wallet: Arc<OracleWallet>,
    persist_backoff: Duration,
}

impl Verifier {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        ledger: Arc<dyn LedgerClient>,
        wallet: Arc<OracleWallet>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            wallet,
            persist_backoff: DEFAULT_PERSIST_BACKOFF,
        }
    }

    /// Base delay between attempts to persist a COMPLETED result; doubles
    /// after each failure.
    pub fn with_persist_backoff(mut self, backoff: Duration) -> Self {
        self.persist_backoff = backoff;
        self
    }

    pub async fn process(&self, request: &VerificationRequest) -> VerificationOutcome {
        let request_id = request.request_id.as_str();

        if let Err(e) = self
            .gateway
            .update_request(request_id, &UpdateVerificationRequest::processing())
            .await
        {
            warn!(request_id, error = %e, "could not claim verification request; skipping");
            return VerificationOutcome::Skipped {
                reason: e.to_string(),
            };
        }
        info!(request_id, asset_id = request.asset_id, "processing verification request");

        match self.verify(request).await {
            Ok((evidence, submitted)) => self.persist_completed(request_id, evidence, submitted).await,
            Err(e) => {
                let reason = e.to_string();
                warn!(request_id, error = %reason, "verification failed");

                let update = UpdateVerificationRequest::failed(reason.clone(), e.broadcast_tx_hash());
                if let Err(update_error) = self.gateway.update_request(request_id, &update).await {
                    error!(
                        request_id,
                        error = %update_error,
                        "could not record verification failure"
                    );
                }
                VerificationOutcome::Failed { reason }
            }
        }
    }

    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<(CreatedEvidence, SubmittedEvent), VerifierError> {
        let records = self.gateway.fetch_service_records(request.asset_id).await?;
        if records.is_empty() {
            return Err(VerifierError::NoServiceRecords);
        }
        if !records.iter().all(|record| record.verified) {
            return Err(VerifierError::ValidationFailed);
        }
        info!(request_id = %request.request_id, records = records.len(), "service records verified");

        let payload = self.evidence_payload(request, &records);
        let evidence = self.gateway.create_evidence(&payload).await?;

        let data_hash = calculate_hash(&payload)?;
        if !data_hash.eq_ignore_ascii_case(&evidence.data_hash) {
            return Err(VerifierError::Hash(format!(
                "record store hashed evidence {} as {}, expected {}",
                evidence.id, evidence.data_hash, data_hash
            )));
        }

        let digest = parse_digest(&data_hash)?;
        let signature = self.wallet.sign_digest(&digest)?;

        let asset_id =
            u64::try_from(request.asset_id).map_err(|_| VerifierError::InvalidAssetId(request.asset_id))?;
        let submitted = self
            .ledger
            .submit_verified_event(asset_id, &digest, &signature)
            .await?;

        Ok((evidence, submitted))
    }

    fn evidence_payload(&self, request: &VerificationRequest, records: &[ServiceRecord]) -> EvidencePayload {
        let service_records: Vec<_> = records
            .iter()
            .map(|record| {
                json!({
                    "recordId": record.record_id,
                    "serviceType": record.service_type,
                    "serviceDate": record.service_date,
                })
            })
            .collect();

        EvidencePayload {
            asset_id: request.asset_id,
            event_type: EventType::Verification,
            event_date: Utc::now().format("%Y-%m-%d").to_string(),
            provider_id: request.provider_id.clone(),
            provider_name: records.first().map(|record| record.provider_id.clone()),
            description: Some(EVIDENCE_DESCRIPTION.to_string()),
            metadata: Some(json!({
                "serviceRecords": service_records,
                "verifiedBy": self.wallet.checksum_address(),
            })),
        }
    }

    /// Store the COMPLETED result, retrying with doubling backoff. The
    /// request is never marked FAILED from here.
    async fn persist_completed(
        &self,
        request_id: &str,
        evidence: CreatedEvidence,
        submitted: SubmittedEvent,
    ) -> VerificationOutcome {
        let event_id = i64::try_from(submitted.event_id).unwrap_or(i64::MAX);
        let update = UpdateVerificationRequest::completed(
            event_id,
            submitted.tx_hash.clone(),
            evidence.data_hash.clone(),
            evidence.id,
        );

        let mut backoff = self.persist_backoff;
        let mut last_error = None;
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.gateway.update_request(request_id, &update).await {
                Ok(()) => {
                    info!(
                        request_id,
                        tx_hash = %submitted.tx_hash,
                        event_id = submitted.event_id,
                        evidence_id = evidence.id,
                        "verification completed"
                    );
                    return VerificationOutcome::Completed {
                        tx_hash: submitted.tx_hash,
                        event_id: submitted.event_id,
                        evidence_id: evidence.id,
                    };
                }
                Err(e) => {
                    warn!(request_id, attempt, error = %e, "failed to persist completed verification");
                    last_error = Some(e);
                    if attempt < PERSIST_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        let reason = format!(
            "event recorded in {} but result not persisted: {}",
            submitted.tx_hash,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        error!(request_id, tx_hash = %submitted.tx_hash, "{}", reason);
        VerificationOutcome::Failed { reason }
    }
}
