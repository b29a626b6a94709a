use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::application::DEFAULT_SCAN_INTERVAL;
use crate::domain::ResourceConfig;

/// Which resource manager implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    Systemd,
    Fixture,
}

impl ManagerKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "systemd" => Some(Self::Systemd),
            "fixture" | "mock" => Some(Self::Fixture),
            _ => None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub poll_interval: u64,
    pub resources_path: PathBuf,
    pub manager: ManagerKind,
    pub systemctl: PathBuf,
    pub proc_path: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("SITEWATCH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            poll_interval: env::var("SITEWATCH_POLL_INTERVAL")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SCAN_INTERVAL.as_secs()),
            resources_path: env::var("SITEWATCH_RESOURCES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("resources.toml")),
            manager: env::var("SITEWATCH_MANAGER")
                .ok()
                .and_then(|s| ManagerKind::parse(&s))
                .unwrap_or(ManagerKind::Systemd),
            systemctl: env::var("SITEWATCH_SYSTEMCTL")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("systemctl")),
            proc_path: env::var("SITEWATCH_PROC_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/proc")),
            log_level: env::var("SITEWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resource catalog {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid resource catalog: {0}")]
    Syntax(#[from] toml::de::Error),

    #[error("invalid resource {id:?}: {reason}")]
    Invalid { id: String, reason: String },
}

/// The list of resources to manage, as read from the catalog file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceCatalog {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl ResourceCatalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Catalogs edited on Windows often start with a BOM
        let content = content.trim_start_matches('\u{feff}');
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            let invalid = |reason: &str| ConfigError::Invalid {
                id: resource.id.to_string(),
                reason: reason.to_string(),
            };

            if resource.id.as_str().trim().is_empty() {
                return Err(invalid("empty id"));
            }
            if !seen.insert(resource.id.clone()) {
                return Err(invalid("duplicate id"));
            }
            if resource.location.trim().is_empty() {
                return Err(invalid("empty location"));
            }
        }
        Ok(())
    }
}
