use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use nix::unistd::{sysconf, SysconfVar};

use crate::domain::ProcessMetrics;

use super::parser::{self, ParseError, ParseResult, ProcStat};

/// One reading of a process from procfs
#[derive(Debug, Clone, Copy)]
pub struct ProcessSample {
    pub stat: ProcStat,
    pub taken_at: Instant,
    /// Seconds since boot when the sample was taken
    pub uptime: f64,
}

/// Cached knowledge about a service's main process.
///
/// Keeps the previous sample so CPU usage can be computed as a delta.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
    last: ProcessSample,
}

impl ProcessHandle {
    /// Same process as the one this handle was opened for
    pub fn matches(&self, sample: &ProcessSample) -> bool {
        self.pid == sample.stat.pid && self.last.stat.starttime == sample.stat.starttime
    }
}

/// Reads per-process figures from procfs
#[derive(Debug, Clone)]
pub struct ProcfsReader {
    proc_path: PathBuf,
    clock_ticks: u64,
    page_size: u64,
}

impl ProcfsReader {
    pub fn new(proc_path: impl Into<PathBuf>) -> Self {
        let clock_ticks = sysconf(SysconfVar::CLK_TCK)
            .ok()
            .flatten()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(100);
        let page_size = sysconf(SysconfVar::PAGE_SIZE)
            .ok()
            .flatten()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(4096);

        Self {
            proc_path: proc_path.into(),
            clock_ticks,
            page_size,
        }
    }

    /// Sample a process. `Ok(None)` when the process no longer exists.
    pub fn sample(&self, pid: u32) -> ParseResult<Option<ProcessSample>> {
        let stat_content = match fs::read_to_string(self.proc_path.join(pid.to_string()).join("stat")) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stat = parser::parse_proc_stat(&stat_content)?;

        let uptime_content = fs::read_to_string(self.proc_path.join("uptime"))?;
        let uptime = parser::parse_uptime(&uptime_content)?;

        Ok(Some(ProcessSample {
            stat,
            taken_at: Instant::now(),
            uptime,
        }))
    }

    /// Open a handle for a process seen for the first time
    pub fn open_handle(&self, sample: ProcessSample) -> ParseResult<ProcessHandle> {
        let stat_content = fs::read_to_string(self.proc_path.join("stat"))?;
        let boot_time = parser::parse_boot_time(&stat_content)?;
        let started_secs = sample.stat.starttime as f64 / self.clock_ticks as f64;
        let created_millis = boot_time * 1000 + (started_secs * 1000.0) as i64;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_millis)
            .ok_or_else(|| ParseError::Parse(format!("start time out of range: {}", created_millis)))?;

        Ok(ProcessHandle {
            pid: sample.stat.pid,
            created_at,
            last: sample,
        })
    }

    /// Turn a fresh sample into metrics, advancing the handle.
    ///
    /// With no previous sample for this process the lifetime average is
    /// reported instead of a delta.
    pub fn metrics(&self, handle: &mut ProcessHandle, sample: ProcessSample, fresh: bool) -> ProcessMetrics {
        let cpu_percent = if fresh {
            let cpu_secs = sample.stat.cpu_ticks() as f64 / self.clock_ticks as f64;
            let alive_secs = sample.uptime - sample.stat.starttime as f64 / self.clock_ticks as f64;
            percent(cpu_secs, alive_secs)
        } else {
            let ticks = sample.stat.cpu_ticks().saturating_sub(handle.last.stat.cpu_ticks());
            let cpu_secs = ticks as f64 / self.clock_ticks as f64;
            let wall_secs = sample.taken_at.duration_since(handle.last.taken_at).as_secs_f64();
            percent(cpu_secs, wall_secs)
        };

        handle.last = sample;
        ProcessMetrics::new(handle.pid, handle.created_at)
            .with_usage(cpu_percent, sample.stat.rss * self.page_size)
    }
}

fn percent(cpu_secs: f64, wall_secs: f64) -> f64 {
    if wall_secs > 0.0 {
        cpu_secs / wall_secs * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_proc(root: &std::path::Path, pid: u32, utime: u64, starttime: u64) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        let stat = format!(
            "{} (svc) S 1 {} {} 0 -1 0 0 0 0 0 {} 0 0 0 20 0 1 0 {} 1000 256 0\n",
            pid, pid, pid, utime, starttime
        );
        fs::write(dir.join("stat"), stat).unwrap();
        fs::write(root.join("uptime"), "1000.00 4000.00\n").unwrap();
        fs::write(root.join("stat"), "cpu 1 2 3 4\nbtime 1700000000\n").unwrap();
    }

    #[test]
    fn test_missing_process_samples_as_none() {
        let root = tempfile::tempdir().unwrap();
        let reader = ProcfsReader::new(root.path());
        assert!(reader.sample(9999).unwrap().is_none());
    }

    #[test]
    fn test_first_sample_reports_lifetime_average() {
        let root = tempfile::tempdir().unwrap();
        let reader = ProcfsReader::new(root.path());
        let ticks = reader.clock_ticks;
        // Started 500s after boot, uptime 1000s, 50s of CPU: 10%
        write_proc(root.path(), 77, 50 * ticks, 500 * ticks);

        let sample = reader.sample(77).unwrap().unwrap();
        let mut handle = reader.open_handle(sample).unwrap();
        let metrics = reader.metrics(&mut handle, sample, true);

        assert_eq!(metrics.pid, 77);
        assert!((metrics.cpu_percent - 10.0).abs() < 0.01);
        assert_eq!(metrics.memory_bytes, 256 * reader.page_size);
        assert_eq!(metrics.created_at.timestamp(), 1_700_000_500);
    }

    #[test]
    fn test_later_samples_report_delta_usage() {
        let root = tempfile::tempdir().unwrap();
        let reader = ProcfsReader::new(root.path());
        let ticks = reader.clock_ticks;
        write_proc(root.path(), 77, 50 * ticks, 500 * ticks);

        let first = reader.sample(77).unwrap().unwrap();
        let mut handle = reader.open_handle(first).unwrap();
        reader.metrics(&mut handle, first, true);

        // 2s more CPU over 10s of wall time: 20%
        write_proc(root.path(), 77, 52 * ticks, 500 * ticks);
        let mut second = reader.sample(77).unwrap().unwrap();
        second.taken_at = first.taken_at + std::time::Duration::from_secs(10);
        assert!(handle.matches(&second));

        let metrics = reader.metrics(&mut handle, second, false);
        assert!((metrics.cpu_percent - 20.0).abs() < 0.01);
        assert_eq!(metrics.created_at, handle.created_at);

        // The handle moved on to the second sample
        let mut idle = second;
        idle.taken_at = second.taken_at + std::time::Duration::from_secs(10);
        assert_eq!(reader.metrics(&mut handle, idle, false).cpu_percent, 0.0);
    }

    #[test]
    fn test_handle_matches_same_process_only() {
        let root = tempfile::tempdir().unwrap();
        let reader = ProcfsReader::new(root.path());
        write_proc(root.path(), 77, 0, 100);
        let sample = reader.sample(77).unwrap().unwrap();
        let handle = reader.open_handle(sample).unwrap();
        assert!(handle.matches(&sample));

        write_proc(root.path(), 78, 0, 100);
        let other = reader.sample(78).unwrap().unwrap();
        assert!(!handle.matches(&other));

        // Same PID reused by a process started later
        write_proc(root.path(), 77, 0, 200);
        let restarted = reader.sample(77).unwrap().unwrap();
        assert!(!handle.matches(&restarted));
    }
}
