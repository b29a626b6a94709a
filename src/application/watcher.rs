use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::{ResourceConfig, ResourceId, ResourceStatus, RunState};
use crate::ports::ResourceManager;

use super::snapshot::SnapshotStore;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Batches buffered for the consumer before new ones are dropped
pub const UPDATE_CHANNEL_CAPACITY: usize = 10;

/// Statuses that changed during one tick
pub type StatusBatch = Vec<ResourceStatus>;

/// What a single tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub changed: usize,
    pub published: bool,
}

/// Periodically probes every service resource and publishes the ones whose
/// status moved since the last publication.
pub struct ResourceWatcher {
    services: Vec<ResourceConfig>,
    manager: Arc<dyn ResourceManager>,
    snapshots: Arc<SnapshotStore>,
    updates: mpsc::Sender<StatusBatch>,
    interval: Duration,
}

impl ResourceWatcher {
    /// Build a watcher over the service entries of `resources`.
    ///
    /// Returns the receiving end of the update channel alongside it.
    pub fn new(
        resources: &[ResourceConfig],
        manager: Arc<dyn ResourceManager>,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<StatusBatch>) {
        let services: Vec<ResourceConfig> = resources
            .iter()
            .filter(|r| r.is_service())
            .cloned()
            .collect();
        let snapshots = Arc::new(SnapshotStore::new(services.iter().map(|s| &s.id)));
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        let watcher = Self {
            services,
            manager,
            snapshots,
            updates: tx,
            interval,
        };
        (watcher, rx)
    }

    /// Read access to the last published statuses
    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    /// Tick until `cancel` turns true or its sender is dropped.
    ///
    /// Only the wait between ticks observes cancellation; a tick that has
    /// started runs to completion, and no new tick starts once cancellation
    /// is seen. A tick that overruns the interval causes the missed ticks to
    /// be skipped.
    pub async fn start(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            "Watching {} services every {:?}",
            self.services.len(),
            self.interval
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Resource watcher stopped");
    }

    /// Probe every service concurrently, wait for all of them, then publish
    /// the changed statuses as one batch without blocking.
    pub async fn tick(&self) -> TickOutcome {
        let changed: Arc<Mutex<StatusBatch>> = Arc::new(Mutex::new(Vec::new()));
        let mut probes = JoinSet::new();

        for service in &self.services {
            let manager = Arc::clone(&self.manager);
            let snapshots = Arc::clone(&self.snapshots);
            let changed = Arc::clone(&changed);
            let id = service.id.clone();
            let unit = service.location.clone();

            probes.spawn(async move {
                let current = probe(manager.as_ref(), id, &unit).await;
                if snapshots.replace_if_changed(&current) {
                    changed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(current);
                }
            });
        }

        while let Some(result) = probes.join_next().await {
            if let Err(e) = result {
                warn!("Probe task failed: {}", e);
            }
        }

        let batch = std::mem::take(&mut *changed.lock().unwrap_or_else(PoisonError::into_inner));
        let count = batch.len();
        if count == 0 {
            return TickOutcome {
                changed: 0,
                published: false,
            };
        }

        let published = match self.updates.try_send(batch) {
            Ok(()) => {
                debug!("Published {} changed statuses", count);
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Update channel full; dropping batch of {}", count);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Update receiver closed; dropping batch of {}", count);
                false
            }
        };

        TickOutcome {
            changed: count,
            published,
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// Observe one service. Never fails: an unreadable state counts as stopped
/// and unreadable metrics are left out.
async fn probe(manager: &dyn ResourceManager, id: ResourceId, unit: &str) -> ResourceStatus {
    let state = match manager.get_resource_state(unit).await {
        Ok(state) => state,
        Err(e) => {
            debug!("State of {} unreadable, reporting stopped: {}", unit, e);
            RunState::Stopped
        }
    };

    if !state.is_running() {
        return ResourceStatus::stopped(id);
    }

    let status = ResourceStatus::running(id);
    match manager.get_service_metrics(unit).await {
        Ok(Some(metrics)) => status.with_metrics(metrics),
        Ok(None) => status,
        Err(e) => {
            debug!("Metrics of {} unavailable: {}", unit, e);
            status
        }
    }
}
