use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::application::{ControlError, StatusBatch, SupportService};
use crate::domain::{InstallFile, ResourceConfig, ResourceId, ResourceMetrics, ResourceStatus, RunState};
use crate::ports::ManagerError;

use super::events::shutdown_requested;

/// Error type that maps control failures onto HTTP status codes
#[derive(Debug)]
pub struct AppError(ControlError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ControlError::UnknownResource(_) => StatusCode::NOT_FOUND,
            ControlError::NotAService(_)
            | ControlError::NotInstallable(_)
            | ControlError::InvalidFile { .. } => StatusCode::BAD_REQUEST,
            ControlError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ControlError::Manager { source, .. } => match source {
                ManagerError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
                ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
                ManagerError::CommandFailed { .. } => StatusCode::BAD_GATEWAY,
                ManagerError::Io(_) | ManagerError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ControlError::Install { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        AppError(err)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub support: Arc<SupportService>,
    pub events: broadcast::Sender<StatusBatch>,
    /// Flips to true when the server is shutting down; ends event streams
    pub shutdown: watch::Receiver<bool>,
}

/// Response for /api/resources, /api/services and /api/directories
#[derive(Debug, Serialize)]
pub struct ResourcesResponse {
    pub timestamp: String,
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesResponse {
    fn new(resources: Vec<ResourceConfig>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            resources,
        }
    }
}

/// Response for /api/services/status
#[derive(Debug, Serialize)]
pub struct StatusesResponse {
    pub timestamp: String,
    pub statuses: Vec<ResourceStatus>,
}

/// Response for state queries and start/stop
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub id: ResourceId,
    pub state: RunState,
}

/// Response for /api/resources/{id}/metrics
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub id: ResourceId,
    pub metrics: Option<ResourceMetrics>,
}

/// Body for /api/resources/{id}/install
#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub files: Vec<InstallFile>,
}

#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub id: ResourceId,
    pub installed: usize,
}

/// Handler for GET /api/health
pub async fn health_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": "sitewatch"
        })),
    )
}

/// Handler for GET /api/resources
pub async fn resources_handler(State(state): State<AppState>) -> Json<ResourcesResponse> {
    Json(ResourcesResponse::new(state.support.resources().to_vec()))
}

/// Handler for GET /api/services
pub async fn services_handler(State(state): State<AppState>) -> Json<ResourcesResponse> {
    Json(ResourcesResponse::new(state.support.services()))
}

/// Handler for GET /api/directories
pub async fn directories_handler(State(state): State<AppState>) -> Json<ResourcesResponse> {
    Json(ResourcesResponse::new(state.support.directories()))
}

/// Handler for GET /api/services/status
pub async fn statuses_handler(State(state): State<AppState>) -> Json<StatusesResponse> {
    Json(StatusesResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        statuses: state.support.latest_statuses(),
    })
}

/// Handler for GET /api/services/{id}/status
pub async fn service_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StateResponse>, AppError> {
    let id = ResourceId::from(id);
    let run_state = state.support.get_service_status(&id).await?;
    Ok(Json(StateResponse { id, state: run_state }))
}

/// Handler for GET /api/resources/{id}/metrics
pub async fn metrics_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MetricsResponse>, AppError> {
    let id = ResourceId::from(id);
    let metrics = state.support.get_resource_metrics(&id).await?;
    Ok(Json(MetricsResponse { id, metrics }))
}

/// Handler for POST /api/services/{id}/start
pub async fn start_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StateResponse>, AppError> {
    let id = ResourceId::from(id);
    state.support.start_service(&id).await?;
    Ok(Json(StateResponse {
        id,
        state: RunState::Running,
    }))
}

/// Handler for POST /api/services/{id}/stop
pub async fn stop_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StateResponse>, AppError> {
    let id = ResourceId::from(id);
    state.support.stop_service(&id).await?;
    Ok(Json(StateResponse {
        id,
        state: RunState::Stopped,
    }))
}

/// Handler for POST /api/resources/{id}/install
pub async fn install_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InstallRequest>,
) -> Result<Json<InstallResponse>, AppError> {
    let id = ResourceId::from(id);
    state.support.install(&id, &request.files).await?;
    Ok(Json(InstallResponse {
        id,
        installed: request.files.len(),
    }))
}

/// Handler for GET /api/events (server-sent `services-update` events).
///
/// The stream ends on server shutdown so graceful shutdown is not held up
/// by connected clients.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.events.subscribe();

    let events = stream::unfold(updates, |mut updates| async move {
        loop {
            match updates.recv().await {
                Ok(batch) => match Event::default().event("services-update").json_data(&batch) {
                    Ok(event) => return Some((Ok(event), updates)),
                    Err(e) => warn!("Failed to encode update batch: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event client lagged, skipped {} batches", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events.take_until(shutdown_requested(state.shutdown.clone())))
        .keep_alive(KeepAlive::default())
}
