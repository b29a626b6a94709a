mod adapters;
mod application;
mod config;
mod domain;
mod interface;
mod ports;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{FixtureManager, SystemdConfig, SystemdManager};
use application::{LifecycleController, ResourceWatcher, SupportService};
use config::{Config, ConfigError, ManagerKind, ResourceCatalog};
use interface::http::{create_router, forward_updates, AppState, EVENT_BUFFER};
use ports::ResourceManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sitewatch={},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SiteWatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    let catalog = match ResourceCatalog::load(&config.resources_path) {
        Ok(catalog) => catalog,
        Err(e @ ConfigError::Missing(_)) => {
            warn!("{}; nothing to watch", e);
            ResourceCatalog::default()
        }
        Err(e) => return Err(e.into()),
    };
    info!("Loaded {} resources", catalog.resources.len());

    // Initialize the resource manager
    let manager: Arc<dyn ResourceManager> = match config.manager {
        ManagerKind::Systemd => Arc::new(SystemdManager::new(SystemdConfig::new(
            config.systemctl.clone(),
            config.proc_path.clone(),
        ))),
        ManagerKind::Fixture => {
            warn!("Using the fixture manager; no real services will be touched");
            Arc::new(FixtureManager::from_catalog(&catalog.resources))
        }
    };
    manager.connect().await?;
    info!("Connected to {:?} resource manager", config.manager);

    // Watcher and application service
    let (watcher, updates) =
        ResourceWatcher::new(&catalog.resources, manager.clone(), config.scan_interval());
    let watcher = Arc::new(watcher);

    let support = Arc::new(
        SupportService::new(
            catalog.resources,
            manager.clone(),
            LifecycleController::new(manager.clone()),
        )
        .with_snapshots(watcher.snapshots()),
    );

    let (events, _) = broadcast::channel(EVENT_BUFFER);
    tokio::spawn(forward_updates(updates, events.clone()));

    // Stops the watcher and ends open event streams
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_task = {
        let watcher = watcher.clone();
        let cancel = shutdown_rx.clone();
        tokio::spawn(async move { watcher.start(cancel).await })
    };

    // Create HTTP server
    let app = create_router(AppState {
        support,
        events,
        shutdown: shutdown_rx,
    });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("SiteWatch listening on {}", addr);
    info!("  → API: http://localhost:{}/api/resources", config.port);
    info!("  → Events: http://localhost:{}/api/events", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    info!("Waiting for the watcher to finish");
    if let Err(e) = watcher_task.await {
        error!("Watcher task failed: {}", e);
    }
    manager.disconnect().await?;

    Ok(())
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    let _ = shutdown.send(true);
}
