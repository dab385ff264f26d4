//! The oracle worker: preflight checks, then a ticker that drains pending
//! verification requests one at a time until shutdown.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::gateway::BackendGateway;
use super::ledger::{LedgerClient, LedgerError};
use super::verifier::{VerificationOutcome, Verifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(
        "oracle {address} is not a trusted oracle; the EventRegistry owner must run \
         eventRegistry.addTrustedOracle(\"{address}\")"
    )]
    NotRegistered { address: String },

    #[error("preflight check failed: {0}")]
    Preflight(#[from] LedgerError),
}

/// Tally of one poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PollReport {
    fn record(&mut self, outcome: &VerificationOutcome) {
        match outcome {
            VerificationOutcome::Completed { .. } => self.completed += 1,
            VerificationOutcome::Failed { .. } => self.failed += 1,
            VerificationOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

pub struct OracleWorker {
    gateway: Arc<dyn BackendGateway>,
    ledger: Arc<dyn LedgerClient>,
    verifier: Verifier,
    address: String,
    poll_interval: Duration,
    min_balance_wei: u128,
    state: watch::Sender<WorkerState>,
}

impl OracleWorker {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        ledger: Arc<dyn LedgerClient>,
        verifier: Verifier,
        address: impl Into<String>,
        poll_interval: Duration,
        min_balance_wei: u128,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Stopped);
        Self {
            gateway,
            ledger,
            verifier,
            address: address.into(),
            poll_interval,
            min_balance_wei,
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
        debug!(?state, "oracle worker state");
    }

    /// Registration and balance checks. Registration problems are fatal; a
    /// low balance is only reported.
    pub async fn start(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Starting);
        info!(address = %self.address, "VeriPass oracle worker starting");

        let preflight = async {
            if !self.ledger.is_trusted_oracle(&self.address).await? {
                return Err(WorkerError::NotRegistered {
                    address: self.address.clone(),
                });
            }
            info!("oracle is registered");

            let balance = self.ledger.balance(&self.address).await?;
            info!(balance_eth = %format_ether(balance), "oracle balance");
            if balance < self.min_balance_wei {
                warn!(
                    balance_eth = %format_ether(balance),
                    minimum_eth = %format_ether(self.min_balance_wei),
                    "low oracle balance"
                );
            }
            Ok(())
        };

        if let Err(e) = preflight.await {
            self.set_state(WorkerState::Stopped);
            return Err(e);
        }
        Ok(())
    }

    /// Poll every `poll_interval` (first poll immediately) until `shutdown`
    /// turns true or its sender is dropped. A request that is being
    /// processed when shutdown arrives is finished; the rest of that batch
    /// stays PENDING.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.set_state(WorkerState::Running);
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "polling for verification requests");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.poll(Some(&shutdown)).await;
                    if report.fetched > 0 {
                        info!(
                            fetched = report.fetched,
                            completed = report.completed,
                            failed = report.failed,
                            skipped = report.skipped,
                            "poll finished"
                        );
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        info!("stopping oracle worker");
        self.set_state(WorkerState::Stopped);
    }

    /// Fetch pending requests and process them in order.
    pub async fn poll_once(&self) -> PollReport {
        self.poll(None).await
    }

    async fn poll(&self, shutdown: Option<&watch::Receiver<bool>>) -> PollReport {
        let mut report = PollReport::default();

        let requests = match self.gateway.fetch_pending_requests().await {
            Ok(requests) => requests,
            Err(e) => {
                error!(error = %e, "polling error");
                return report;
            }
        };

        report.fetched = requests.len();
        if requests.is_empty() {
            debug!("no pending verification requests");
            return report;
        }
        info!(count = requests.len(), "found pending verification requests");

        for request in &requests {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!(request_id = %request.request_id, "shutdown requested; leaving remaining requests pending");
                break;
            }
            let outcome = self.verifier.process(request).await;
            report.record(&outcome);
        }

        report
    }
}

/// Wei as a decimal ETH string, trailing zeros trimmed
pub fn format_ether(wei: u128) -> String {
    const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
    let whole = wei / WEI_PER_ETH;
    let fraction = wei % WEI_PER_ETH;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:018}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}
