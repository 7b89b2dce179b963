//! roversign-rs entry point.

mod adapters;
mod runtime;

use rover_common::Config;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::runtime::Runtime;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rover=debug".into()),
        )
        .init();

    info!("Starting roversign-rs...");

    // Load configuration
    let config = Config::load()?;
    info!(state_file = %config.state.state_file().display(), "Configuration loaded");

    // Connect to database
    let db = rover_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    rover_db::migrate(&db).await?;
    info!("Migrations completed");

    let active_days = config.schedule.active_days;
    let runtime = Runtime::start(config, db)?;
    info!("roversign-rs started");

    match runtime.activity().active_user_count().await {
        Ok(count) => info!(
            active_users = count,
            window_days = active_days,
            "Activity window loaded"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to count active users"),
    }

    shutdown_signal().await;

    let metrics = runtime.shutdown().await;
    info!(
        activity_signals = metrics.activity_signals,
        activity_rows_flushed = metrics.activity_rows_flushed,
        activity_flush_failures = metrics.activity_flush_failures,
        write_gate_timeouts = metrics.write_gate_timeouts,
        hook_failures = metrics.hook_failures,
        broadcast_delivered = metrics.broadcast_delivered,
        broadcast_failed = metrics.broadcast_failed,
        broadcast_skipped = metrics.broadcast_skipped,
        jobs_started = metrics.jobs_started,
        jobs_completed = metrics.jobs_completed,
        jobs_rejected_busy = metrics.jobs_rejected_busy,
        jobs_recovered = metrics.jobs_recovered,
        "Shutdown complete"
    );
    Ok(())
}
