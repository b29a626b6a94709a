use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics for the main process of a running service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

impl ProcessMetrics {
    pub fn new(pid: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            pid,
            created_at,
            cpu_percent: 0.0,
            memory_bytes: 0,
        }
    }

    pub fn with_usage(mut self, cpu_percent: f64, memory_bytes: u64) -> Self {
        self.cpu_percent = cpu_percent;
        self.memory_bytes = memory_bytes;
        self
    }
}

/// Metrics for a directory tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMetrics {
    pub total_bytes: u64,
    pub file_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DirectoryMetrics {
    pub fn new(total_bytes: u64, file_count: u64) -> Self {
        Self {
            total_bytes,
            file_count,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// Resource consumption, shaped by the kind of resource it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceMetrics {
    Process(ProcessMetrics),
    Directory(DirectoryMetrics),
}

impl From<ProcessMetrics> for ResourceMetrics {
    fn from(metrics: ProcessMetrics) -> Self {
        Self::Process(metrics)
    }
}

impl From<DirectoryMetrics> for ResourceMetrics {
    fn from(metrics: DirectoryMetrics) -> Self {
        Self::Directory(metrics)
    }
}
