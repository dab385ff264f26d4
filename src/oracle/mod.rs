//! The oracle worker process: polls the record store for pending
//! verification requests, checks them and records the verified ones on the
//! EventRegistry.

pub mod gateway;
pub mod ledger;
pub mod verifier;
pub mod wallet;
pub mod worker;

pub use gateway::{BackendGateway, GatewayError, HttpGateway};
pub use ledger::{EvmLedgerClient, LedgerClient, LedgerError, SubmittedEvent};
pub use verifier::{VerificationOutcome, Verifier, VerifierError};
pub use wallet::OracleWallet;
pub use worker::{OracleWorker, PollReport, WorkerError, WorkerState};
