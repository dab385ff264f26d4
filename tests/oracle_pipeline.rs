mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use common::*;
use veripass_server::app_state::AppState;
use veripass_server::auth::Caller;
use veripass_server::config::DEFAULT_MIN_BALANCE_WEI;
use veripass_server::error::AppError;
use veripass_server::hash::{calculate_hash, parse_digest};
use veripass_server::models::{
    CreateEvidenceRequest, CreateVerificationRequest, CreatedEvidence, EvidencePayload,
    EvidenceStatus, RequestType, ServiceRecord, UpdateVerificationRequest, VerificationRequest,
    VerificationStatus,
};
use veripass_server::oracle::wallet::recover_digest_signer;
use veripass_server::oracle::{
    BackendGateway, GatewayError, LedgerClient, LedgerError, OracleWallet, OracleWorker,
    PollReport, SubmittedEvent, VerificationOutcome, Verifier, WorkerError, WorkerState,
};

const LEDGER_TX: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

fn gateway_error(error: AppError) -> GatewayError {
    match error {
        AppError::Validation(m) => GatewayError::Validation(m),
        AppError::Unauthorized(m) | AppError::Forbidden(m) => GatewayError::Unauthorized(m),
        AppError::Conflict(m) => GatewayError::Conflict(m),
        AppError::NotFound(m) => GatewayError::NotFound(m),
        other => GatewayError::Server {
            status: 500,
            message: other.to_string(),
        },
    }
}

/// Gateway that calls the record store services directly
struct StoreGateway {
    state: AppState,
    failing_completions: AtomicU32,
    failing_pending_fetches: AtomicU32,
    failing_record_fetches: AtomicU32,
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable() -> GatewayError {
    GatewayError::Server {
        status: 503,
        message: "store unavailable".to_string(),
    }
}

#[async_trait]
impl BackendGateway for StoreGateway {
    async fn fetch_pending_requests(&self) -> Result<Vec<VerificationRequest>, GatewayError> {
        if take_failure(&self.failing_pending_fetches) {
            return Err(unavailable());
        }
        self.state
            .verification_service
            .list_pending()
            .await
            .map_err(gateway_error)
    }

    async fn fetch_service_records(&self, asset_id: i64) -> Result<Vec<ServiceRecord>, GatewayError> {
        if take_failure(&self.failing_record_fetches) {
            return Err(unavailable());
        }
        self.state
            .service_record_service
            .list_by_asset(asset_id)
            .await
            .map_err(gateway_error)
    }

    async fn update_request(
        &self,
        request_id: &str,
        update: &UpdateVerificationRequest,
    ) -> Result<(), GatewayError> {
        if update.status == VerificationStatus::Completed && take_failure(&self.failing_completions) {
            return Err(unavailable());
        }
        self.state
            .verification_service
            .update_request(request_id, update.clone())
            .await
            .map(|_| ())
            .map_err(gateway_error)
    }

    async fn create_evidence(&self, payload: &EvidencePayload) -> Result<CreatedEvidence, GatewayError> {
        let evidence = self
            .state
            .evidence_service
            .create_evidence(CreateEvidenceRequest::from(payload.clone()), &Caller::Oracle)
            .await
            .map_err(gateway_error)?;
        Ok(CreatedEvidence::from(evidence.get()))
    }
}

#[derive(Clone, Copy)]
enum LedgerOutcome {
    Event(u64),
    Revert,
    Unconfirmed,
}

struct Submission {
    asset_id: u64,
    data_hash: [u8; 32],
    signature: [u8; 65],
}

struct FakeLedger {
    trusted: bool,
    balance: u128,
    outcome: LedgerOutcome,
    submissions: Mutex<Vec<Submission>>,
}

impl FakeLedger {
    fn new(outcome: LedgerOutcome) -> Self {
        Self {
            trusted: true,
            balance: DEFAULT_MIN_BALANCE_WEI * 10,
            outcome,
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn is_trusted_oracle(&self, _address: &str) -> Result<bool, LedgerError> {
        Ok(self.trusted)
    }

    async fn balance(&self, _address: &str) -> Result<u128, LedgerError> {
        Ok(self.balance)
    }

    async fn submit_verified_event(
        &self,
        asset_id: u64,
        data_hash: &[u8; 32],
        signature: &[u8; 65],
    ) -> Result<SubmittedEvent, LedgerError> {
        self.submissions.lock().unwrap().push(Submission {
            asset_id,
            data_hash: *data_hash,
            signature: *signature,
        });
        match self.outcome {
            LedgerOutcome::Event(event_id) => Ok(SubmittedEvent {
                tx_hash: LEDGER_TX.to_string(),
                event_id,
                block_number: 100,
            }),
            LedgerOutcome::Revert => Err(LedgerError::Reverted {
                tx_hash: LEDGER_TX.to_string(),
            }),
            LedgerOutcome::Unconfirmed => Err(LedgerError::Unconfirmed {
                tx_hash: LEDGER_TX.to_string(),
                source: Box::new(LedgerError::Decode("connection reset".to_string())),
            }),
        }
    }
}

struct Harness {
    state: AppState,
    gateway: Arc<StoreGateway>,
    ledger: Arc<FakeLedger>,
    wallet: Arc<OracleWallet>,
}

impl Harness {
    async fn new(ledger: FakeLedger) -> Self {
        let state = app_state().await;
        Self {
            gateway: Arc::new(StoreGateway {
                state: state.clone(),
                failing_completions: AtomicU32::new(0),
                failing_pending_fetches: AtomicU32::new(0),
                failing_record_fetches: AtomicU32::new(0),
            }),
            state,
            ledger: Arc::new(ledger),
            wallet: Arc::new(OracleWallet::from_hex(ORACLE_PRIVATE_KEY).unwrap()),
        }
    }

    fn verifier(&self) -> Verifier {
        Verifier::new(self.gateway.clone(), self.ledger.clone(), self.wallet.clone())
            .with_persist_backoff(Duration::from_millis(1))
    }

    fn worker(&self) -> OracleWorker {
        OracleWorker::new(
            self.gateway.clone(),
            self.ledger.clone(),
            self.verifier(),
            self.wallet.checksum_address(),
            Duration::from_millis(20),
            DEFAULT_MIN_BALANCE_WEI,
        )
    }

    async fn asset_with_records(&self, asset_id: i64, verified: &[bool]) {
        seed_asset(&self.state, asset_id).await;
        for (index, verified) in verified.iter().enumerate() {
            self.state
                .service_record_service
                .create_record(service_record(
                    asset_id,
                    &format!("SR-{asset_id}-{index}"),
                    *verified,
                ))
                .await
                .unwrap();
        }
    }

    async fn pending_request(&self, asset_id: i64) -> VerificationRequest {
        self.state
            .verification_service
            .create_request(
                CreateVerificationRequest {
                    asset_id,
                    request_type: RequestType::ServiceVerification,
                    provider_id: Some("provider-1".to_string()),
                },
                OWNER,
            )
            .await
            .unwrap()
            .into_inner()
    }

    async fn reload(&self, request: &VerificationRequest) -> VerificationRequest {
        self.state
            .verification_service
            .get_request(&request.request_id)
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn verified_records_are_recorded_on_chain_and_reconciled() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(7))).await;
    harness.asset_with_records(1, &[true, true]).await;
    let request = harness.pending_request(1).await;

    let report = harness.worker().poll_once().await;
    assert_eq!(
        report,
        PollReport {
            fetched: 1,
            completed: 1,
            failed: 0,
            skipped: 0
        }
    );

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Completed);
    assert_eq!(request.blockchain_event_id, Some(7));
    assert_eq!(request.tx_hash.as_deref(), Some(LEDGER_TX));
    assert!(request.processed_at.is_some());

    let evidence_id = request.evidence_id.unwrap();
    let evidence = harness
        .state
        .evidence_service
        .get_evidence(evidence_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.data_hash.as_deref(), Some(evidence.data_hash.as_str()));
    assert_eq!(evidence.status, EvidenceStatus::Confirmed);
    assert!(evidence.is_verified);
    assert_eq!(evidence.blockchain_event_id, Some(7));
    let oracle = ORACLE_ADDRESS.to_lowercase();
    assert_eq!(evidence.verified_by.as_deref(), Some(oracle.as_str()));
    assert_eq!(evidence.provider_name.as_deref(), Some("provider-1"));

    let metadata = &evidence.metadata.as_ref().unwrap().0;
    assert_eq!(metadata["verifiedBy"], ORACLE_ADDRESS);
    assert_eq!(metadata["serviceRecords"].as_array().unwrap().len(), 2);
    assert_eq!(metadata["serviceRecords"][0]["recordId"], "SR-1-0");

    let submissions = harness.ledger.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(submission.asset_id, 1);
    assert_eq!(submission.data_hash, parse_digest(&evidence.data_hash).unwrap());
    assert_eq!(
        recover_digest_signer(&submission.data_hash, &submission.signature).unwrap(),
        harness.wallet.address()
    );
}

#[tokio::test]
async fn evidence_hash_covers_exactly_the_submitted_payload() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(1))).await;
    harness.asset_with_records(2, &[true]).await;
    let request = harness.pending_request(2).await;

    harness.verifier().process(&request).await;
    let request = harness.reload(&request).await;
    let evidence = harness
        .state
        .evidence_service
        .get_evidence(request.evidence_id.unwrap())
        .await
        .unwrap()
        .unwrap();

    let payload = EvidencePayload {
        asset_id: evidence.asset_id,
        event_type: evidence.event_type,
        event_date: evidence.event_date.clone(),
        provider_id: evidence.provider_id.clone(),
        provider_name: evidence.provider_name.clone(),
        description: evidence.description.clone(),
        metadata: evidence.metadata.as_ref().map(|m| m.0.clone()),
    };
    assert_eq!(calculate_hash(&payload).unwrap(), evidence.data_hash);
}

#[tokio::test]
async fn unverified_records_fail_without_touching_the_ledger() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(7))).await;
    harness.asset_with_records(1, &[true, false]).await;
    let request = harness.pending_request(1).await;

    let outcome = harness.verifier().process(&request).await;
    assert_eq!(
        outcome,
        VerificationOutcome::Failed {
            reason: "Service records validation failed".to_string()
        }
    );

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Failed);
    assert_eq!(
        request.error_message.as_deref(),
        Some("Service records validation failed")
    );
    assert!(request.tx_hash.is_none());
    assert_eq!(harness.ledger.submission_count(), 0);
}

#[tokio::test]
async fn assets_without_records_fail() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(7))).await;
    harness.asset_with_records(1, &[]).await;
    let request = harness.pending_request(1).await;

    let report = harness.worker().poll_once().await;
    assert_eq!(report.failed, 1);

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Failed);
    assert_eq!(request.error_message.as_deref(), Some("No service records found"));
    assert!(request.evidence_id.is_none());
}

#[tokio::test]
async fn a_request_claimed_elsewhere_is_skipped() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(7))).await;
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    harness
        .state
        .verification_service
        .update_request(&request.request_id, UpdateVerificationRequest::processing())
        .await
        .unwrap();

    let outcome = harness.verifier().process(&request).await;
    assert!(matches!(outcome, VerificationOutcome::Skipped { .. }));

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Processing);
    assert!(request.error_message.is_none());
    assert_eq!(harness.ledger.submission_count(), 0);
}

#[tokio::test]
async fn reverted_transactions_are_failed_with_their_hash() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Revert)).await;
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    let outcome = harness.verifier().process(&request).await;
    assert!(matches!(outcome, VerificationOutcome::Failed { .. }));

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Failed);
    assert_eq!(request.tx_hash.as_deref(), Some(LEDGER_TX));
    assert!(request
        .error_message
        .as_deref()
        .unwrap()
        .contains("Transaction reverted"));

    // evidence stays PENDING until something lands on-chain
    let evidence = harness.state.evidence_service.list_by_asset(1).await.unwrap();
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0].status, EvidenceStatus::Pending);
}

#[tokio::test]
async fn unconfirmed_submissions_keep_the_broadcast_hash() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Unconfirmed)).await;
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    let outcome = harness.verifier().process(&request).await;
    assert!(matches!(outcome, VerificationOutcome::Failed { .. }));

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Failed);
    assert_eq!(request.tx_hash.as_deref(), Some(LEDGER_TX));
}

#[tokio::test]
async fn record_fetch_errors_fail_the_request_and_polling_continues() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(4))).await;
    harness.gateway.failing_record_fetches.store(1, Ordering::SeqCst);
    harness.asset_with_records(1, &[true]).await;
    harness.asset_with_records(2, &[true]).await;
    let first = harness.pending_request(1).await;
    let worker = harness.worker();

    let report = worker.poll_once().await;
    assert_eq!(report.fetched, 1);
    assert_eq!(report.failed, 1);
    let first = harness.reload(&first).await;
    assert_eq!(first.status, VerificationStatus::Failed);
    assert!(first
        .error_message
        .as_deref()
        .is_some_and(|message| message.contains("store unavailable")));

    let second = harness.pending_request(2).await;
    let report = worker.poll_once().await;
    assert_eq!(report.completed, 1);
    assert_eq!(
        harness.reload(&second).await.status,
        VerificationStatus::Completed
    );
}

#[tokio::test]
async fn pending_fetch_errors_wait_for_the_next_poll() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(4))).await;
    harness.gateway.failing_pending_fetches.store(1, Ordering::SeqCst);
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;
    let worker = harness.worker();

    assert_eq!(worker.poll_once().await, PollReport::default());
    assert_eq!(
        harness.reload(&request).await.status,
        VerificationStatus::Pending
    );

    let report = worker.poll_once().await;
    assert_eq!(report.fetched, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(
        harness.reload(&request).await.status,
        VerificationStatus::Completed
    );
}

#[tokio::test]
async fn completed_result_is_retried_until_persisted() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(3))).await;
    harness.gateway.failing_completions.store(2, Ordering::SeqCst);
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    let outcome = harness.verifier().process(&request).await;
    assert!(matches!(
        outcome,
        VerificationOutcome::Completed { event_id: 3, .. }
    ));

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Completed);
    assert_eq!(harness.ledger.submission_count(), 1);
}

#[tokio::test]
async fn unpersisted_completion_is_never_marked_failed() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(3))).await;
    harness.gateway.failing_completions.store(10, Ordering::SeqCst);
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    let outcome = harness.verifier().process(&request).await;
    assert!(matches!(outcome, VerificationOutcome::Failed { reason } if reason.contains(LEDGER_TX)));

    let request = harness.reload(&request).await;
    assert_eq!(request.status, VerificationStatus::Processing);
}

#[tokio::test]
async fn preflight_rejects_unregistered_oracles() {
    let mut ledger = FakeLedger::new(LedgerOutcome::Event(1));
    ledger.trusted = false;
    let harness = Harness::new(ledger).await;
    let worker = harness.worker();

    let error = worker.start().await.unwrap_err();
    match error {
        WorkerError::NotRegistered { address } => assert_eq!(address, ORACLE_ADDRESS),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn low_balance_only_warns() {
    let mut ledger = FakeLedger::new(LedgerOutcome::Event(1));
    ledger.balance = 1;
    let harness = Harness::new(ledger).await;
    let worker = harness.worker();

    worker.start().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Starting);
}

#[tokio::test]
async fn worker_polls_until_shutdown() {
    let harness = Harness::new(FakeLedger::new(LedgerOutcome::Event(7))).await;
    harness.asset_with_records(1, &[true]).await;
    let request = harness.pending_request(1).await;

    let worker = Arc::new(harness.worker());
    worker.start().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if harness.reload(&request).await.status == VerificationStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(worker.state(), WorkerState::Running);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(harness.ledger.submission_count(), 1);
}
