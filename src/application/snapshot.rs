use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::domain::{ResourceId, ResourceMetrics, ResourceStatus};

/// CPU movement (percentage points) below which a sample is noise
pub const CPU_THRESHOLD_PERCENT: f64 = 0.5;

/// Memory / size movement below which a sample is noise
pub const MEMORY_THRESHOLD_BYTES: u64 = 2 * 1024 * 1024;

/// Decide whether `current` is worth publishing over `previous`
pub fn has_changed(previous: Option<&ResourceStatus>, current: &ResourceStatus) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.state != current.state {
        return true;
    }

    match (&previous.metrics, &current.metrics) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(ResourceMetrics::Process(old)), Some(ResourceMetrics::Process(new))) => {
            (old.cpu_percent - new.cpu_percent).abs() > CPU_THRESHOLD_PERCENT
                || old.memory_bytes.abs_diff(new.memory_bytes) > MEMORY_THRESHOLD_BYTES
                || old.pid != new.pid
        }
        (Some(ResourceMetrics::Directory(old)), Some(ResourceMetrics::Directory(new))) => {
            old.total_bytes.abs_diff(new.total_bytes) > MEMORY_THRESHOLD_BYTES
                || old.last_modified != new.last_modified
        }
        _ => true,
    }
}

/// Last published status per resource.
///
/// The key set is fixed at construction; each entry has its own lock so
/// probes for different resources never contend.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: HashMap<ResourceId, Mutex<Option<ResourceStatus>>>,
}

impl SnapshotStore {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        Self {
            entries: ids.into_iter().map(|id| (id.clone(), Mutex::new(None))).collect(),
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<ResourceStatus> {
        self.entries
            .get(id)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the entry for `current.id` if [`has_changed`] says so.
    ///
    /// Comparison and replacement happen under the entry lock. Returns
    /// whether the entry was replaced.
    pub fn replace_if_changed(&self, current: &ResourceStatus) -> bool {
        let Some(entry) = self.entries.get(&current.id) else {
            warn!("Ignoring status for unknown resource {}", current.id);
            return false;
        };

        let mut slot = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if !has_changed(slot.as_ref(), current) {
            return false;
        }
        *slot = Some(current.clone());
        true
    }

    /// Every entry that has been published at least once
    pub fn all(&self) -> Vec<ResourceStatus> {
        let mut statuses: Vec<ResourceStatus> = self
            .entries
            .values()
            .filter_map(|entry| entry.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
