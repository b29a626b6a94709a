pub mod error;
pub mod lifecycle;
pub mod snapshot;
pub mod support;
pub mod watcher;

pub use error::{ControlError, ControlResult};
pub use lifecycle::{ConvergencePolicy, LifecycleController};
pub use snapshot::SnapshotStore;
pub use support::SupportService;
pub use watcher::{ResourceWatcher, StatusBatch, DEFAULT_SCAN_INTERVAL};
