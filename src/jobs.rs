//! Background jobs run by the API process

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::error;

use crate::services::VerificationService;

pub const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically fail verification requests stuck in PROCESSING.
///
/// Runs until `shutdown` flips to true or its sender is dropped.
pub async fn stale_request_detector(
    verification_service: Arc<VerificationService>,
    stale_after: Duration,
    check_every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(stale_after_secs = stale_after.as_secs(), "Starting stale request detector");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(check_every) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match verification_service.fail_stale_requests(stale_after).await {
            Ok(0) => {}
            Ok(failed) => tracing::info!(failed, "failed stale verification requests"),
            Err(e) => tracing::error!("Error detecting stale requests: {}", e),
        }
    }

    tracing::info!("stale request detector stopped");
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it. The
/// SIGTERM handler is installed when this is called, not when first polled.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = signal(SignalKind::terminate());
    async move {
        match terminate {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
    }
}
