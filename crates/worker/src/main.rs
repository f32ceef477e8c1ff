use std::sync::Arc;
use std::time::Duration;

use covenant_core::clock::SystemClock;
use covenant_core::service::CheckInServices;
use covenant_db::PgStore;
use covenant_worker::background::expiry_sweep;
use covenant_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "covenant_worker=debug,covenant_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        request_ttl_minutes = config.request_ttl_minutes,
        sweep_interval_secs = config.sweep_interval_secs,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = covenant_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    covenant_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    covenant_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let services = CheckInServices::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock),
        config.policy(),
    );

    // --- Jobs ---
    let cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(expiry_sweep::run(
        services.requests.clone(),
        config.sweep_interval(),
        cancel.clone(),
    ));

    shutdown_signal().await;

    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), sweep_handle)
        .await
        .is_err()
    {
        tracing::warn!("Expiry sweep did not stop within 5s");
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
