pub mod metrics;
pub mod resource;
pub mod status;

pub use metrics::{DirectoryMetrics, ProcessMetrics, ResourceMetrics};
pub use resource::{InstallFile, ResourceConfig, ResourceId, ResourceKind};
pub use status::{ResourceStatus, RunState};
