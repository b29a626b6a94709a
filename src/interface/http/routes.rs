use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers::{
    directories_handler, events_handler, health_handler, install_handler, metrics_handler,
    resources_handler, service_status_handler, services_handler, start_handler,
    statuses_handler, stop_handler, AppState,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Catalog
        .route("/api/health", get(health_handler))
        .route("/api/resources", get(resources_handler))
        .route("/api/services", get(services_handler))
        .route("/api/directories", get(directories_handler))
        // Status and metrics
        .route("/api/services/status", get(statuses_handler))
        .route("/api/services/{id}/status", get(service_status_handler))
        .route("/api/resources/{id}/metrics", get(metrics_handler))
        // Lifecycle
        .route("/api/services/{id}/start", post(start_handler))
        .route("/api/services/{id}/stop", post(stop_handler))
        .route("/api/resources/{id}/install", post(install_handler))
        // Push updates
        .route("/api/events", get(events_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
