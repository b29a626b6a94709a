use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{DirectoryMetrics, ProcessMetrics, ResourceConfig, ResourceKind, RunState};
use crate::ports::{ManagerError, ManagerResult, ResourceManager};

/// A call observed by [`FixtureManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCall {
    Connect,
    Disconnect,
    GetState(String),
    GetMetrics(String),
    GetDirectoryMetrics(String),
    Start(String),
    Stop(String),
}

#[derive(Debug, Clone)]
struct FixtureService {
    state: RunState,
    metrics: Option<ProcessMetrics>,
    state_fails: bool,
    metrics_fails: bool,
    /// Accepts start/stop but never changes state
    stuck: bool,
    /// Refuses start/stop outright
    rejects: bool,
}

impl FixtureService {
    fn new(state: RunState) -> Self {
        Self {
            state,
            metrics: None,
            state_fails: false,
            metrics_fails: false,
            stuck: false,
            rejects: false,
        }
    }
}

/// In-memory resource manager with scriptable behaviour.
///
/// Used by the test suite and by `SITEWATCH_MANAGER=fixture` for running
/// the API on hosts without systemd. Every call is recorded.
pub struct FixtureManager {
    connected: AtomicBool,
    services: Mutex<HashMap<String, FixtureService>>,
    directories: Mutex<HashMap<String, DirectoryMetrics>>,
    calls: Mutex<Vec<ManagerCall>>,
}

impl FixtureManager {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            services: Mutex::new(HashMap::new()),
            directories: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed every catalog entry: services running with sample usage,
    /// directories with sample sizes.
    pub fn from_catalog(resources: &[ResourceConfig]) -> Self {
        let mut manager = Self::new();
        for (index, resource) in resources.iter().enumerate() {
            match resource.kind {
                ResourceKind::Service => {
                    let pid = 1000 + index as u32;
                    manager = manager.with_service(&resource.location, RunState::Running).with_metrics(
                        &resource.location,
                        ProcessMetrics::new(pid, Utc::now()).with_usage(2.5, 100 * 1024 * 1024),
                    );
                }
                ResourceKind::Directory => {
                    manager = manager.with_directory(
                        &resource.location,
                        DirectoryMetrics::new(200 * 1024 * 1024, 42).with_last_modified(Utc::now()),
                    );
                }
            }
        }
        manager
    }

    pub fn with_service(self, name: &str, state: RunState) -> Self {
        self.services_mut()
            .insert(name.to_string(), FixtureService::new(state));
        self
    }

    pub fn with_metrics(self, name: &str, metrics: ProcessMetrics) -> Self {
        self.set_metrics(name, Some(metrics));
        self
    }

    pub fn with_directory(self, path: &str, metrics: DirectoryMetrics) -> Self {
        self.directories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), metrics);
        self
    }

    pub fn stuck(self, name: &str) -> Self {
        self.update(name, |svc| svc.stuck = true);
        self
    }

    pub fn rejecting(self, name: &str) -> Self {
        self.update(name, |svc| svc.rejects = true);
        self
    }

    pub fn set_state(&self, name: &str, state: RunState) {
        self.update(name, |svc| svc.state = state);
    }

    pub fn set_metrics(&self, name: &str, metrics: Option<ProcessMetrics>) {
        self.update(name, |svc| svc.metrics = metrics);
    }

    pub fn set_state_fails(&self, name: &str, fails: bool) {
        self.update(name, |svc| svc.state_fails = fails);
    }

    pub fn set_metrics_fails(&self, name: &str, fails: bool) {
        self.update(name, |svc| svc.metrics_fails = fails);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count_calls(&self, call: &ManagerCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    fn services_mut(&self) -> std::sync::MutexGuard<'_, HashMap<String, FixtureService>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut FixtureService)) {
        if let Some(svc) = self.services_mut().get_mut(name) {
            f(svc);
        }
    }

    fn record(&self, call: ManagerCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn ensure_connected(&self) -> ManagerResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ManagerError::NotConnected)
        }
    }

    fn service(&self, name: &str) -> ManagerResult<FixtureService> {
        self.services_mut()
            .get(name)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    fn command(&self, command: &'static str, name: &str, target: RunState) -> ManagerResult<()> {
        self.ensure_connected()?;
        let svc = self.service(name)?;
        if svc.rejects {
            return Err(ManagerError::CommandFailed {
                command,
                target: name.to_string(),
                message: "access denied".to_string(),
            });
        }
        if !svc.stuck {
            self.set_state(name, target);
        }
        Ok(())
    }
}

impl Default for FixtureManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManager for FixtureManager {
    async fn connect(&self) -> ManagerResult<()> {
        self.record(ManagerCall::Connect);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ManagerResult<()> {
        self.record(ManagerCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_resource_state(&self, name: &str) -> ManagerResult<RunState> {
        self.record(ManagerCall::GetState(name.to_string()));
        self.ensure_connected()?;
        let svc = self.service(name)?;
        if svc.state_fails {
            return Err(ManagerError::Io(std::io::Error::other(format!(
                "query failed for {}",
                name
            ))));
        }
        Ok(svc.state)
    }

    async fn get_service_metrics(&self, name: &str) -> ManagerResult<Option<ProcessMetrics>> {
        self.record(ManagerCall::GetMetrics(name.to_string()));
        self.ensure_connected()?;
        let svc = self.service(name)?;
        if svc.metrics_fails {
            return Err(ManagerError::Parse(format!("unreadable process for {}", name)));
        }
        if !svc.state.is_running() {
            return Ok(None);
        }
        Ok(svc.metrics)
    }

    async fn get_directory_metrics(&self, path: &str) -> ManagerResult<DirectoryMetrics> {
        self.record(ManagerCall::GetDirectoryMetrics(path.to_string()));
        self.ensure_connected()?;
        self.directories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(path.to_string()))
    }

    async fn start_service(&self, name: &str) -> ManagerResult<()> {
        self.record(ManagerCall::Start(name.to_string()));
        self.command("start", name, RunState::Running)
    }

    async fn stop_service(&self, name: &str) -> ManagerResult<()> {
        self.record(ManagerCall::Stop(name.to_string()));
        self.command("stop", name, RunState::Stopped)
    }
}
