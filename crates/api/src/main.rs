use anyhow::Context;
use domain::services::{InventoryService, InviteStore, MemoryInviteStore};
use persistence::db::{create_pool, run_migrations};
use persistence::PgInviteStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use invite_pool_api::app::{router, AppState};
use invite_pool_api::config::{Config, StorageBackend};
use invite_pool_api::middleware::{logging::init_logging, init_metrics};
use invite_pool_api::services::{bootstrap_admin, seed_codes};

/// How often idle rate limiter entries are dropped.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    init_metrics().context("Failed to initialize metrics")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.storage.backend,
        "Starting invite pool"
    );

    if config.security.ip_hash_secret.is_empty() {
        warn!("security.ip_hash_secret is empty; caller hashes are unkeyed");
    }

    let store: Arc<dyn InviteStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = create_pool(&(&config.database).into())
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            Arc::new(PgInviteStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; all data is lost on shutdown");
            Arc::new(MemoryInviteStore::new())
        }
    };

    bootstrap_admin(store.as_ref(), &config.admin)
        .await
        .context("Failed to bootstrap admin")?;
    let inventory = InventoryService::new(store.clone(), config.codes.policy());
    seed_codes(store.as_ref(), &inventory, &config.bootstrap)
        .await
        .context("Failed to insert seed codes")?;

    let addr = config.socket_addr();
    let state = AppState::new(config, store).context("Invalid admin token configuration")?;

    if let Some(limiter) = state.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                limiter.prune();
            }
        });
    }

    let app = router(state);

    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
