//! VeriPass oracle worker
//!
//! Polls the record store for pending verification requests, checks the
//! asset's service records and records verified events on the
//! EventRegistry contract.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use veripass_server::config::OracleConfig;
use veripass_server::jobs;
use veripass_server::oracle::{
    EvmLedgerClient, HttpGateway, OracleWallet, OracleWorker, Verifier, WorkerError,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(WorkerError::NotRegistered { address }) = e.downcast_ref::<WorkerError>() {
                error!(%address, "oracle is not registered on the EventRegistry");
                eprintln!("The EventRegistry owner must register this oracle first:");
                eprintln!("  eventRegistry.addTrustedOracle(\"{address}\")");
            } else {
                error!("oracle worker failed: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = OracleConfig::from_env().context("invalid oracle configuration")?;
    let wallet = Arc::new(OracleWallet::from_hex(&config.private_key)?);
    info!(
        address = %wallet.checksum_address(),
        rpc_url = %config.rpc_url,
        backend_url = %config.backend_url,
        event_registry = %config.contracts.event_registry_address,
        "oracle configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let ledger = Arc::new(EvmLedgerClient::new(
        http.clone(),
        config.rpc_url.clone(),
        &config.contracts.event_registry_address,
        wallet.clone(),
        config.receipt_poll_interval,
    )?);
    let gateway = Arc::new(HttpGateway::new(
        http,
        config.backend_url.clone(),
        config.oracle_api_key.clone(),
    ));

    let verifier = Verifier::new(gateway.clone(), ledger.clone(), wallet.clone());
    let worker = OracleWorker::new(
        gateway,
        ledger,
        verifier,
        wallet.checksum_address(),
        config.poll_interval,
        config.min_balance_wei,
    );

    worker.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = jobs::shutdown_signal();
    tokio::spawn(async move {
        signal.await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    info!("oracle worker stopped");
    Ok(())
}
