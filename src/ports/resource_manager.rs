use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DirectoryMetrics, ProcessMetrics, RunState};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("resource manager is not connected")]
    NotConnected,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{command} failed for {target}: {message}")]
    CommandFailed {
        command: &'static str,
        target: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Port for observing and controlling host resources.
///
/// `connect` and `disconnect` are idempotent. Every other call fails with
/// [`ManagerError::NotConnected`] while the manager is disconnected.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn connect(&self) -> ManagerResult<()>;

    async fn disconnect(&self) -> ManagerResult<()>;

    /// Current run state of a service
    async fn get_resource_state(&self, name: &str) -> ManagerResult<RunState>;

    /// Metrics for the main process of a service, `None` when it has none
    async fn get_service_metrics(&self, name: &str) -> ManagerResult<Option<ProcessMetrics>>;

    /// Size and freshness of a directory tree
    async fn get_directory_metrics(&self, path: &str) -> ManagerResult<DirectoryMetrics>;

    /// Request a start. Returns once the request is accepted, not once running.
    async fn start_service(&self, name: &str) -> ManagerResult<()>;

    /// Request a stop. Returns once the request is accepted, not once stopped.
    async fn stop_service(&self, name: &str) -> ManagerResult<()>;
}
