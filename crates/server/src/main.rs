use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_core::{
    load_config, spawn_engine, validate_config, ArtifactStore, FsArtifactStore, OptionsStore,
};

use atelier_server::api::create_router;
use atelier_server::api::driver::DriverHost;
use atelier_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("ATELIER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Output root: {:?}", config.storage.output_root);
    info!("Options file: {:?}", config.storage.options_path);

    // Prompt options persist across restarts; runs do not.
    let options_store = OptionsStore::new(config.storage.options_path.clone());

    // The driver host starts empty; a driver connects over /api/v1/driver.
    let driver_host = Arc::new(DriverHost::new());

    // Spawn the engine. The artifact store reports download lifecycle
    // events back through the engine handle.
    let output_root = config.storage.output_root.clone();
    let engine = spawn_engine(
        config.engine.clone(),
        options_store.clone(),
        driver_host.clone(),
        move |handle| {
            Arc::new(FsArtifactStore::new(output_root, Arc::new(handle.clone())))
                as Arc<dyn ArtifactStore>
        },
    );
    info!("Engine started");

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        engine,
        options_store,
        driver_host,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
