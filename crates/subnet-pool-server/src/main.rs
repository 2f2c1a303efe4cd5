#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::lifecycle::{HttpCallback, LifecycleHandler};
use server::routes::{AppState, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use subnet_pool::{BulkLoader, MemoryTableStore, TableStore};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let store = MemoryTableStore::new();
    for table in &config.tables {
        store.create_table(table.as_str(), config.loader.baseline);
    }
    let store: Arc<dyn TableStore> = Arc::new(store);
    let loader = BulkLoader::new(store, config.loader).context("invalid loader configuration")?;

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let handler = LifecycleHandler::new(
        Arc::new(loader),
        Arc::new(HttpCallback::new()?),
        config.safety_margin,
        shutdown.clone(),
        tracker.clone(),
    );
    let app = router(AppState {
        handler: Arc::new(handler),
        tracker: tracker.clone(),
        invocation_timeout: config.invocation_timeout,
    });

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    log_startup_info(&config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    drain(tracker, &config).await;
    providers.shutdown();

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting subnet pool service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            tables = ?config.tables,
            blocks = config.loader.layout.total_blocks(),
            "Starting subnet pool service on {}",
            config.server_addr,
        );
    }
}

/// Waits for Ctrl+C or SIGTERM, then cancels in-flight lifecycle work.
async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();
}

/// Gives in-flight requests up to the shutdown timeout to report.
async fn drain(tracker: TaskTracker, config: &ServerConfig) {
    tracker.close();
    let pending = tracker.len();
    if pending == 0 {
        return;
    }

    tracing::info!(pending, "Waiting for in-flight requests to report");
    if tokio::time::timeout(config.shutdown_timeout, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = tracker.len(),
            timeout = ?config.shutdown_timeout,
            "In-flight requests did not report before shutdown"
        );
    }
}
