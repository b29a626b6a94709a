use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{
    InstallFile, ResourceConfig, ResourceId, ResourceKind, ResourceMetrics, ResourceStatus, RunState,
};
use crate::ports::ResourceManager;

use super::error::{ControlError, ControlResult};
use super::lifecycle::LifecycleController;
use super::snapshot::SnapshotStore;

/// Main application service: resolves resource IDs and runs the
/// operations exposed to operators
pub struct SupportService {
    resources: Vec<ResourceConfig>,
    by_id: HashMap<ResourceId, ResourceConfig>,
    manager: Arc<dyn ResourceManager>,
    lifecycle: LifecycleController,
    snapshots: Option<Arc<SnapshotStore>>,
}

impl SupportService {
    pub fn new(
        resources: Vec<ResourceConfig>,
        manager: Arc<dyn ResourceManager>,
        lifecycle: LifecycleController,
    ) -> Self {
        let by_id = resources
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        Self {
            resources,
            by_id,
            manager,
            lifecycle,
            snapshots: None,
        }
    }

    /// Serve `latest_statuses` from a watcher's snapshot store
    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }

    pub fn services(&self) -> Vec<ResourceConfig> {
        self.filter_by_kind(ResourceKind::Service)
    }

    pub fn directories(&self) -> Vec<ResourceConfig> {
        self.filter_by_kind(ResourceKind::Directory)
    }

    pub fn resource(&self, id: &ResourceId) -> ControlResult<&ResourceConfig> {
        self.by_id
            .get(id)
            .ok_or_else(|| ControlError::UnknownResource(id.clone()))
    }

    /// Last statuses published by the watcher
    pub fn latest_statuses(&self) -> Vec<ResourceStatus> {
        self.snapshots
            .as_ref()
            .map(|store| store.all())
            .unwrap_or_default()
    }

    /// Query a service's state directly. Errors are not masked.
    pub async fn get_service_status(&self, id: &ResourceId) -> ControlResult<RunState> {
        let resource = self.service(id)?;
        self.manager
            .get_resource_state(&resource.location)
            .await
            .map_err(ControlError::manager(id))
    }

    pub async fn get_resource_metrics(&self, id: &ResourceId) -> ControlResult<Option<ResourceMetrics>> {
        let resource = self.resource(id)?;
        match resource.kind {
            ResourceKind::Service => Ok(self
                .manager
                .get_service_metrics(&resource.location)
                .await
                .map_err(ControlError::manager(id))?
                .map(ResourceMetrics::from)),
            ResourceKind::Directory => Ok(Some(
                self.manager
                    .get_directory_metrics(&resource.location)
                    .await
                    .map_err(ControlError::manager(id))?
                    .into(),
            )),
        }
    }

    pub async fn start_service(&self, id: &ResourceId) -> ControlResult<()> {
        let resource = self.service(id)?;
        self.lifecycle.start_and_wait(resource).await
    }

    pub async fn stop_service(&self, id: &ResourceId) -> ControlResult<()> {
        let resource = self.service(id)?;
        self.lifecycle.stop_and_wait(resource).await
    }

    pub async fn install(&self, id: &ResourceId, files: &[InstallFile]) -> ControlResult<()> {
        let resource = self.resource(id)?;
        self.lifecycle.install(resource, files).await
    }

    fn service(&self, id: &ResourceId) -> ControlResult<&ResourceConfig> {
        let resource = self.resource(id)?;
        if !resource.is_service() {
            return Err(ControlError::NotAService(id.clone()));
        }
        Ok(resource)
    }

    fn filter_by_kind(&self, kind: ResourceKind) -> Vec<ResourceConfig> {
        self.resources
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}
