use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

use super::{driver, handlers, middleware, options, run, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config().server.static_dir.clone();

    // API routes
    let api_routes = Router::new()
        // Health, config, metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Run control
        .route("/run", get(run::get_snapshot))
        .route("/run/start", post(run::start_run))
        .route("/run/pause", post(run::pause_run))
        .route("/run/resume", post(run::resume_run))
        .route("/run/stop", post(run::stop_run))
        // Prompt options
        .route("/options", get(options::get_options).put(options::put_options))
        // Progress stream (dashboard clients)
        .route("/ws", get(ws::ws_handler))
        // Driver channel (the browser worker pool)
        .route("/driver", get(driver::driver_handler))
        .layer(from_fn(middleware::metrics_middleware))
        .with_state(state);

    // Serve dashboard with SPA fallback
    let index_path = static_dir.join("index.html");
    let serve_dir = ServeDir::new(&static_dir).fallback(ServeFile::new(&index_path));

    Router::new()
        .nest("/api/v1", api_routes)
        .fallback_service(serve_dir)
}
