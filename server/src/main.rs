//! Holdfast HTTP server.
//!
//! Hold/confirm reservation engine backed by `PostgreSQL`.

use anyhow::Context;
use holdfast_core::environment::SystemClock;
use holdfast_postgres::PostgresLedger;
use holdfast_runtime::HoldEngineConfig;
use holdfast_runtime::metrics::PrometheusMetrics;
use holdfast_server::{AppState, Config, CorsPolicy, build_router};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "holdfast=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Holdfast HTTP server");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        address = %config.server.bind_address(),
        hold_ttl_seconds = config.engine.hold_ttl_seconds,
        request_timeout_ms = config.engine.request_timeout_ms,
        metrics_enabled = config.metrics_enabled,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let ledger = PostgresLedger::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await
    .context("Failed to connect to database")?;
    ledger.migrate().await.context("Failed to apply migrations")?;

    let mut state = AppState::new(
        Arc::new(ledger),
        Arc::new(SystemClock),
        HoldEngineConfig::default().with_hold_ttl(config.engine.hold_ttl()),
        config.engine.request_timeout(),
    );

    if config.metrics_enabled {
        let metrics = PrometheusMetrics::install().context("Failed to install metrics recorder")?;
        state = state.with_metrics(metrics);
        info!("Prometheus metrics enabled at /metrics");
    }

    let app = build_router(state, &CorsPolicy::new(&config.server.cors_origins));

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    // Fires once a shutdown signal has been received
    let shutting_down = Arc::new(Notify::new());
    let graceful = {
        let shutting_down = shutting_down.clone();
        async move {
            shutdown_signal().await;
            shutting_down.notify_one();
        }
    };

    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            joined.context("Server task failed")?.context("Server error")?;
            return Ok(());
        }
        () = shutting_down.notified() => {}
    }

    let timeout = config.server.shutdown_timeout();
    match tokio::time::timeout(timeout, server).await {
        Ok(joined) => joined.context("Server task failed")?.context("Server error")?,
        Err(_) => warn!(
            timeout_secs = timeout.as_secs(),
            "Graceful shutdown timed out, dropping open connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
