//! bruteguard daemon.
//!
//! Loads configuration, opens the range storage, starts the bucket sweeper and
//! serves the HTTP API until SIGINT/SIGTERM.

use bruteguard::config::{self, BucketBackend, Config, LogFormat};
use bruteguard::db::Database;
use bruteguard::http::{self, AppState};
use bruteguard::metrics;
use bruteguard::security::{AdmissionPolicy, BucketStore, IpListStore, MemoryRangeStorage, RangeStorage};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::config_path(
        std::env::args().nth(1),
        std::env::var(config::CONFIG_ENV).ok(),
    );
    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("failed to load config {}: {e}", config_path.display());
        e
    })?;

    init_tracing(&config);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {}",
            errors.len(),
            config_path.display()
        ));
    }
    config.warn_questionable();

    info!(
        path = %config_path.display(),
        listen = %config.http.listen,
        "Starting bruteguard"
    );

    metrics::init();

    // Range storage
    let storage: Arc<dyn RangeStorage> = match config.database.as_ref() {
        Some(db) => Arc::new(Database::new(&db.path).await?.ranges()),
        None => Arc::new(MemoryRangeStorage::new()),
    };
    let lists = Arc::new(IpListStore::load(storage).await?);

    // Attempt buckets
    let buckets = match config.buckets.backend {
        BucketBackend::Memory => BucketStore::start(config.buckets.policy(&config.limits)),
    };
    let policy = AdmissionPolicy::new(Arc::clone(&lists), buckets.clone());

    let app = http::router(
        AppState::new(policy, config.admin.timeout()),
        config.http.metrics,
    );
    let listener = tokio::net::TcpListener::bind(config.http.listen).await?;
    let served = http::run_http_server(listener, app, shutdown_signal()).await;

    info!("HTTP server stopped, shutting down");
    buckets.shutdown().await;
    if let Err(e) = lists.close().await {
        error!(error = %e, "Failed to close range storage");
    }

    served?;
    info!("bruteguard stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolve on SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
