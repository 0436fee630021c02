//! Region Cache - admin server for the in-process region cache
//!
//! Loads configuration, initializes the configured regions, optionally joins
//! the lateral group and serves the admin API until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_cache::api::{create_router, AppState};
use region_cache::cache::CacheManager;
use region_cache::lateral::UdpMulticastTransport;
use region_cache::Config;

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache manager and its configured regions
/// 4. Join the lateral group when one is configured
/// 5. Serve the admin API on the configured port
/// 6. On SIGINT/SIGTERM, stop serving and shut the manager down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Region Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: regions={:?}, max_objects={}, policy={:?}, port={}",
        config.regions,
        config.region_defaults.max_objects,
        config.region_defaults.eviction_policy,
        config.server_port
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize regions")?;
    let manager: Arc<CacheManager> = state.manager.clone();
    info!("{} region(s) initialized", config.regions.len());

    if let Some(lateral) = &config.lateral {
        let connected = manager
            .connect_lateral(Arc::new(UdpMulticastTransport), lateral)
            .await;
        if connected {
            info!(group = %lateral.group_name, "Lateral propagation enabled");
        } else {
            warn!(group = %lateral.group_name, "Running without lateral propagation");
        }
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
