use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::{InstallFile, ResourceConfig, RunState};
use crate::ports::ResourceManager;

use super::error::{ControlError, ControlResult};

/// How often and for how long to wait for a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Starts and stops services and waits until the change is observed
pub struct LifecycleController {
    manager: Arc<dyn ResourceManager>,
    policy: ConvergencePolicy,
}

impl LifecycleController {
    pub fn new(manager: Arc<dyn ResourceManager>) -> Self {
        Self::with_policy(manager, ConvergencePolicy::default())
    }

    pub fn with_policy(manager: Arc<dyn ResourceManager>, policy: ConvergencePolicy) -> Self {
        Self { manager, policy }
    }

    pub async fn start_and_wait(&self, resource: &ResourceConfig) -> ControlResult<()> {
        self.converge(resource, RunState::Running).await
    }

    pub async fn stop_and_wait(&self, resource: &ResourceConfig) -> ControlResult<()> {
        self.converge(resource, RunState::Stopped).await
    }

    /// Replace a resource's files: stop it, write the files, start it again.
    ///
    /// Directories skip the stop and start. Files already written are left
    /// in place if a later write fails.
    pub async fn install(&self, resource: &ResourceConfig, files: &[InstallFile]) -> ControlResult<()> {
        let target = resource
            .install_dir()
            .ok_or_else(|| ControlError::NotInstallable(resource.id.clone()))?;

        if let Some(bad) = files.iter().find(|f| !f.has_plain_name()) {
            return Err(ControlError::InvalidFile {
                id: resource.id.clone(),
                name: bad.name.clone(),
            });
        }

        if resource.is_service() {
            self.stop_and_wait(resource).await?;
        }

        info!("Installing {} files for {} into {}", files.len(), resource.id, target.display());
        materialize(&target, files).await?;

        if resource.is_service() {
            self.start_and_wait(resource).await?;
        }

        info!("Install finished for {}", resource.id);
        Ok(())
    }

    async fn converge(&self, resource: &ResourceConfig, target: RunState) -> ControlResult<()> {
        if !resource.is_service() {
            return Err(ControlError::NotAService(resource.id.clone()));
        }

        let id = &resource.id;
        let unit = resource.location.as_str();

        let state = self
            .manager
            .get_resource_state(unit)
            .await
            .map_err(ControlError::manager(id))?;
        if state == target {
            debug!("{} already {:?}", id, target);
            return Ok(());
        }

        let accepted = match target {
            RunState::Running => self.manager.start_service(unit).await,
            RunState::Stopped => self.manager.stop_service(unit).await,
        };
        accepted.map_err(ControlError::manager(id))?;

        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut poll = interval_at(started + self.policy.poll_interval, self.policy.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    return Err(ControlError::Timeout {
                        id: id.clone(),
                        target,
                        waited: self.policy.timeout,
                    });
                }
                _ = poll.tick() => {
                    match self.manager.get_resource_state(unit).await {
                        Ok(state) if state == target => {
                            info!("{} reached {:?} after {:?}", id, target, started.elapsed());
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Polling {} failed, retrying: {}", id, e),
                    }
                }
            }
        }
    }
}

async fn materialize(dir: &Path, files: &[InstallFile]) -> ControlResult<()> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ControlError::Install { path, source }
    };

    tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;

    for file in files {
        let path = dir.join(&file.name);
        debug!("Writing {}", path.display());
        tokio::fs::write(&path, &file.data).await.map_err(io_err(&path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(io_err(&path))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixtureManager, ManagerCall};
    use crate::ports::ManagerError;

    async fn controller(manager: FixtureManager) -> (LifecycleController, Arc<FixtureManager>) {
        manager.connect().await.unwrap();
        let manager = Arc::new(manager);
        (LifecycleController::new(manager.clone()), manager)
    }

    fn report() -> ResourceConfig {
        ResourceConfig::service("report", "Report Service", "report.service")
    }

    #[tokio::test]
    async fn test_start_when_running_skips_command() {
        let (lifecycle, manager) =
            controller(FixtureManager::new().with_service("report.service", RunState::Running)).await;

        lifecycle.start_and_wait(&report()).await.unwrap();
        assert_eq!(manager.count_calls(&ManagerCall::Start("report.service".into())), 0);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_skips_command() {
        let (lifecycle, manager) =
            controller(FixtureManager::new().with_service("report.service", RunState::Stopped)).await;

        lifecycle.stop_and_wait(&report()).await.unwrap();
        assert_eq!(manager.count_calls(&ManagerCall::Stop("report.service".into())), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_converges_on_first_running_poll() {
        let (lifecycle, manager) =
            controller(FixtureManager::new().with_service("report.service", RunState::Stopped)).await;

        let started = Instant::now();
        lifecycle.start_and_wait(&report()).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(manager.count_calls(&ManagerCall::Start("report.service".into())), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_times_out_at_deadline() {
        let (lifecycle, _manager) = controller(
            FixtureManager::new()
                .with_service("report.service", RunState::Stopped)
                .stuck("report.service"),
        )
        .await;

        let started = Instant::now();
        let err = lifecycle.start_and_wait(&report()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ControlError::Timeout { target: RunState::Running, .. }));
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_at_deadline() {
        let (lifecycle, _manager) = controller(
            FixtureManager::new()
                .with_service("report.service", RunState::Running)
                .stuck("report.service"),
        )
        .await;

        let started = Instant::now();
        let err = lifecycle.stop_and_wait(&report()).await.unwrap_err();

        assert!(matches!(err, ControlError::Timeout { target: RunState::Stopped, .. }));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_rejected_command_is_not_a_timeout() {
        let (lifecycle, _manager) = controller(
            FixtureManager::new()
                .with_service("report.service", RunState::Stopped)
                .rejecting("report.service"),
        )
        .await;

        let err = lifecycle.start_and_wait(&report()).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Manager { source: ManagerError::CommandFailed { .. }, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_retried_until_converged() {
        let (lifecycle, manager) = controller(
            FixtureManager::new()
                .with_service("report.service", RunState::Stopped)
                .stuck("report.service"),
        )
        .await;

        let flip = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.set_state_fails("report.service", true);
                tokio::time::sleep(Duration::from_secs(3)).await;
                manager.set_state_fails("report.service", false);
                manager.set_state("report.service", RunState::Running);
            })
        };

        // The spawned task first runs once start_and_wait yields, after the
        // initial query and the start command
        let started = Instant::now();
        let result = lifecycle.start_and_wait(&report()).await;
        flip.await.unwrap();

        result.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_directories_are_rejected() {
        let (lifecycle, _manager) = controller(FixtureManager::new()).await;
        let dir = ResourceConfig::directory("kiosk", "Kiosk", "/srv/kiosk");
        assert!(matches!(
            lifecycle.start_and_wait(&dir).await,
            Err(ControlError::NotAService(_))
        ));
    }

    #[tokio::test]
    async fn test_unconnected_manager_surfaces_not_connected() {
        let manager = Arc::new(FixtureManager::new().with_service("report.service", RunState::Stopped));
        let lifecycle = LifecycleController::new(manager);
        assert!(matches!(
            lifecycle.start_and_wait(&report()).await,
            Err(ControlError::Manager { source: ManagerError::NotConnected, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_restarts_service_around_write() {
        let target = tempfile::tempdir().unwrap();
        let (lifecycle, manager) =
            controller(FixtureManager::new().with_service("report.service", RunState::Running)).await;
        let resource = report().with_install_path(target.path().join("bin"));

        lifecycle
            .install(&resource, &[InstallFile::new("report.dll", b"MZ".to_vec())])
            .await
            .unwrap();

        assert_eq!(std::fs::read(target.path().join("bin").join("report.dll")).unwrap(), b"MZ");
        let commands: Vec<ManagerCall> = manager
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ManagerCall::Start(_) | ManagerCall::Stop(_)))
            .collect();
        assert_eq!(
            commands,
            vec![
                ManagerCall::Stop("report.service".into()),
                ManagerCall::Start("report.service".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_install_aborts_before_writing_when_stop_fails() {
        let target = tempfile::tempdir().unwrap();
        let (lifecycle, _manager) = controller(
            FixtureManager::new()
                .with_service("report.service", RunState::Running)
                .rejecting("report.service"),
        )
        .await;
        let install_dir = target.path().join("bin");
        let resource = report().with_install_path(&install_dir);

        let err = lifecycle
            .install(&resource, &[InstallFile::new("report.dll", b"MZ".to_vec())])
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::Manager { .. }));
        assert!(!install_dir.exists());
    }

    #[tokio::test]
    async fn test_install_directory_writes_without_service_calls() {
        let target = tempfile::tempdir().unwrap();
        let (lifecycle, manager) = controller(FixtureManager::new()).await;
        let mut resource =
            ResourceConfig::directory("kiosk", "Kiosk", target.path().to_str().unwrap());
        resource.installable = true;

        lifecycle
            .install(&resource, &[InstallFile::new("index.html", b"<html/>".to_vec())])
            .await
            .unwrap();

        assert!(target.path().join("index.html").exists());
        assert!(manager
            .calls()
            .iter()
            .all(|c| matches!(c, ManagerCall::Connect)));
    }

    #[tokio::test]
    async fn test_install_rejects_traversal_before_stopping() {
        let target = tempfile::tempdir().unwrap();
        let (lifecycle, manager) =
            controller(FixtureManager::new().with_service("report.service", RunState::Running)).await;
        let resource = report().with_install_path(target.path());

        let err = lifecycle
            .install(&resource, &[InstallFile::new("../evil", b"x".to_vec())])
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::InvalidFile { .. }));
        assert_eq!(manager.count_calls(&ManagerCall::Stop("report.service".into())), 0);
    }

    #[tokio::test]
    async fn test_install_requires_installable() {
        let (lifecycle, _manager) = controller(FixtureManager::new()).await;
        assert!(matches!(
            lifecycle.install(&report(), &[]).await,
            Err(ControlError::NotInstallable(_))
        ));
    }
}
