//! Order-Book Recorder Binary
//!
//! Records the market channel for the configured assets until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-recorder
//! RECORDER_PRESET=multiple_markets cargo run --bin orderbook-recorder
//! ```
//!
//! # Environment Variables
//!
//! - `RECORDER_WS_URL`: Market channel URL
//! - `RECORDER_PRESET`: Asset preset name (default: single_market)
//! - `RECORDER_ASSET_IDS`: Comma separated asset ids, overrides the preset
//! - `RECORDER_DATA_DIR`: Log directory (default: data)
//! - `RECORDER_HEALTH_PORT`: Health check HTTP port (default: 8083, 0 disables)
//! - `REFERENCE_BASE_URL`, `REFERENCE_SYMBOL`: Reference price source
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: orderbook_recorder=info)

use std::sync::Arc;

use anyhow::Context;
use orderbook_recorder::infrastructure::telemetry;
use orderbook_recorder::{
    BinanceReferenceSource, RecorderConfig, SystemClock, init_metrics, recorder,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    let telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(
        otlp_export = telemetry_guard.exporting(),
        "Starting order-book recorder"
    );

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = RecorderConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let source = BinanceReferenceSource::new(
        config.reference.base_url.clone(),
        config.reference.symbol.clone(),
        config.reference.request_timeout,
    )
    .context("failed to create reference price client")?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    match recorder::run(
        &config,
        Arc::new(source),
        Arc::new(SystemClock),
        shutdown_token,
    )
    .await
    {
        Ok(summary) => {
            if let Some(session) = summary.session {
                tracing::info!(
                    frames = session.frames,
                    dispatched = session.dispatched,
                    skipped = session.skipped,
                    rejected = session.rejected,
                    "Session totals"
                );
            }
            tracing::info!("Order-book recorder stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Order-book recorder failed");
            Err(e.into())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RecorderConfig) {
    tracing::info!(
        preset = config.venue.preset.as_deref().unwrap_or("explicit"),
        assets = config.venue.targets.len(),
        data_dir = %config.storage.data_dir.display(),
        health_port = config.server.health_port,
        reference_symbol = %config.reference.symbol,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.venue.ws_url,
        reference_url = %config.reference.base_url,
        toggles = ?config.storage.toggles,
        "Endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
