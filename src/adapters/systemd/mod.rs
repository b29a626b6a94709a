mod parser;
mod process;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{DirectoryMetrics, ProcessMetrics, RunState};
use crate::ports::{ManagerError, ManagerResult, ResourceManager};

use super::directory;
use parser::ParseError;
use process::{ProcessHandle, ProcfsReader};

/// Paths used by the systemd adapter (overridable for containers)
#[derive(Debug, Clone)]
pub struct SystemdConfig {
    pub systemctl: PathBuf,
    pub proc_path: PathBuf,
}

impl SystemdConfig {
    pub fn new(systemctl: impl Into<PathBuf>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            systemctl: systemctl.into(),
            proc_path: proc_path.into(),
        }
    }

    pub fn host() -> Self {
        Self {
            systemctl: PathBuf::from("systemctl"),
            proc_path: PathBuf::from("/proc"),
        }
    }
}

impl Default for SystemdConfig {
    fn default() -> Self {
        Self::host()
    }
}

impl From<ParseError> for ManagerError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(e) => ManagerError::Io(e),
            other => ManagerError::Parse(other.to_string()),
        }
    }
}

/// Resource manager backed by systemd and procfs
pub struct SystemdManager {
    config: SystemdConfig,
    procfs: ProcfsReader,
    connected: AtomicBool,
    /// Main-process handles keyed by unit name
    handles: Mutex<HashMap<String, ProcessHandle>>,
}

impl SystemdManager {
    pub fn new(config: SystemdConfig) -> Self {
        let procfs = ProcfsReader::new(config.proc_path.clone());
        Self {
            config,
            procfs,
            connected: AtomicBool::new(false),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_paths() -> Self {
        Self::new(SystemdConfig::default())
    }

    fn ensure_connected(&self) -> ManagerResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ManagerError::NotConnected)
        }
    }

    fn forget_handle(&self, unit: &str) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(unit);
    }

    async fn show(&self, unit: &str) -> ManagerResult<HashMap<String, String>> {
        let output = Command::new(&self.config.systemctl)
            .args(["show", unit, "--property=LoadState,ActiveState,MainPID"])
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ManagerError::CommandFailed {
                command: "show",
                target: unit.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let props = parser::parse_unit_properties(&String::from_utf8_lossy(&output.stdout));
        if props.get("LoadState").map(String::as_str) == Some("not-found") {
            return Err(ManagerError::NotFound(unit.to_string()));
        }
        Ok(props)
    }

    async fn control(&self, command: &'static str, unit: &str) -> ManagerResult<()> {
        self.ensure_connected()?;
        info!("systemctl {} {}", command, unit);

        let output = Command::new(&self.config.systemctl)
            .args([command, "--no-block", unit])
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if message.contains("not found") || message.contains("not loaded") {
            return Err(ManagerError::NotFound(unit.to_string()));
        }
        Err(ManagerError::CommandFailed {
            command,
            target: unit.to_string(),
            message,
        })
    }
}

#[async_trait]
impl ResourceManager for SystemdManager {
    async fn connect(&self) -> ManagerResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let output = Command::new(&self.config.systemctl)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ManagerError::CommandFailed {
                command: "--version",
                target: self.config.systemctl.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Connected to {}", version.lines().next().unwrap_or("systemd"));
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ManagerResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            info!("Disconnected from systemd");
        }
        Ok(())
    }

    async fn get_resource_state(&self, name: &str) -> ManagerResult<RunState> {
        self.ensure_connected()?;
        let props = self.show(name).await?;
        let active = props
            .get("ActiveState")
            .ok_or_else(|| ManagerError::Parse(format!("no ActiveState for {}", name)))?;
        Ok(parser::run_state_from_active(active))
    }

    async fn get_service_metrics(&self, name: &str) -> ManagerResult<Option<ProcessMetrics>> {
        self.ensure_connected()?;
        let props = self.show(name).await?;
        let pid: u32 = props
            .get("MainPID")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if pid == 0 {
            self.forget_handle(name);
            return Ok(None);
        }

        let reader = self.procfs.clone();
        let sample = tokio::task::spawn_blocking(move || reader.sample(pid))
            .await
            .map_err(|e| ManagerError::Io(std::io::Error::other(e)))??;
        let Some(sample) = sample else {
            self.forget_handle(name);
            return Ok(None);
        };

        let cached = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .filter(|handle| handle.matches(&sample))
            .cloned();

        let (mut handle, fresh) = match cached {
            Some(handle) => (handle, false),
            None => {
                debug!("Opening process handle for {} (pid {})", name, pid);
                (self.procfs.open_handle(sample)?, true)
            }
        };

        let metrics = self.procfs.metrics(&mut handle, sample, fresh);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), handle);

        Ok(Some(metrics))
    }

    async fn get_directory_metrics(&self, path: &str) -> ManagerResult<DirectoryMetrics> {
        self.ensure_connected()?;
        directory::directory_metrics(path).await
    }

    async fn start_service(&self, name: &str) -> ManagerResult<()> {
        self.control("start", name).await
    }

    async fn stop_service(&self, name: &str) -> ManagerResult<()> {
        self.control("stop", name).await
    }
}
