use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{ResourceId, RunState};
use crate::ports::ManagerError;

/// Errors surfaced by the imperative operations
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("resource not found: {0}")]
    UnknownResource(ResourceId),

    #[error("resource is not a service: {0}")]
    NotAService(ResourceId),

    #[error("resource is not installable: {0}")]
    NotInstallable(ResourceId),

    #[error("invalid file name {name:?} for {id}")]
    InvalidFile { id: ResourceId, name: String },

    #[error("{id}: {source}")]
    Manager {
        id: ResourceId,
        source: ManagerError,
    },

    /// The command was accepted but the state never converged
    #[error("timed out after {waited:?} waiting for {id} to become {target:?}")]
    Timeout {
        id: ResourceId,
        target: RunState,
        waited: Duration,
    },

    #[error("failed to write {}: {source}", path.display())]
    Install {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ControlError {
    pub fn manager(id: &ResourceId) -> impl FnOnce(ManagerError) -> Self + '_ {
        move |source| Self::Manager {
            id: id.clone(),
            source,
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
