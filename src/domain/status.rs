use serde::{Deserialize, Serialize};

use super::{ProcessMetrics, ResourceId, ResourceMetrics};

/// Observed run state of a resource.
///
/// Transitional OS states (starting, stopping, paused) are reported as
/// `Stopped`; only a fully running resource is `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// One point-in-time observation of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub id: ResourceId,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,
}

impl ResourceStatus {
    pub fn stopped(id: ResourceId) -> Self {
        Self {
            id,
            state: RunState::Stopped,
            metrics: None,
        }
    }

    pub fn running(id: ResourceId) -> Self {
        Self {
            id,
            state: RunState::Running,
            metrics: None,
        }
    }

    /// Attach metrics. Ignored unless the resource is running.
    pub fn with_metrics(mut self, metrics: impl Into<ResourceMetrics>) -> Self {
        if self.state.is_running() {
            self.metrics = Some(metrics.into());
        }
        self
    }

    pub fn process_metrics(&self) -> Option<&ProcessMetrics> {
        match &self.metrics {
            Some(ResourceMetrics::Process(metrics)) => Some(metrics),
            _ => None,
        }
    }
}
