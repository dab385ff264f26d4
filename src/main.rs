//! VeriPass record store server
//!
//! Serves the asset, evidence, verification request and service record
//! APIs, and runs the stale verification request detector in the
//! background.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::sync::watch;
use tokio::time::sleep;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use veripass_server::app_state::AppState;
use veripass_server::config::ServerConfig;
use veripass_server::middleware::ORACLE_KEY_HEADER;
use veripass_server::services::VerificationService;
use veripass_server::{db, jobs, routes};

const DETECTOR_SUPERVISOR_MAX_BACKOFF_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let db_pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let state = AppState::new(db_pool, &config.jwt_secret, &config.oracle_api_key);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    spawn_stale_detector(
        state.verification_service.clone(),
        config.stale_processing_after,
        shutdown_rx,
    );

    let app = routes::api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server starting on {}", addr);

    let signal = jobs::shutdown_signal();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Run the detector under a supervisor that restarts it with backoff if
/// the task panics.
fn spawn_stale_detector(
    verification_service: Arc<VerificationService>,
    stale_after: Duration,
    shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut restart_count: u32 = 0;
        loop {
            let handle = tokio::spawn(jobs::stale_request_detector(
                verification_service.clone(),
                stale_after,
                jobs::STALE_CHECK_INTERVAL,
                shutdown.clone(),
            ));

            match handle.await {
                Ok(()) => {
                    info!("stale request detector exited; stopping supervisor");
                    break;
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!("stale request detector panicked; restarting");
                    } else {
                        error!(error = %join_error, "stale request detector task failed; restarting");
                    }
                }
            }

            restart_count = restart_count.saturating_add(1);
            let backoff_seconds = (2u64.saturating_pow(restart_count.min(5)))
                .min(DETECTOR_SUPERVISOR_MAX_BACKOFF_SECONDS);
            warn!(restart_count, backoff_seconds, "stale request detector restart backoff");
            sleep(Duration::from_secs(backoff_seconds)).await;
        }
    });
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(ORACLE_KEY_HEADER),
        ])
        .allow_credentials(false)
}
