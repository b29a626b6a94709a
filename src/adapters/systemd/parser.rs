use std::collections::HashMap;

use thiserror::Error;

use crate::domain::RunState;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse /proc/uptime into seconds
pub fn parse_uptime(content: &str) -> ParseResult<f64> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::Parse("Empty uptime file".to_string()))?;

    first
        .parse::<f64>()
        .map_err(|e| ParseError::Parse(format!("Invalid uptime value: {}", e)))
}

/// Parse the `btime` line of /proc/stat (boot time, seconds since epoch)
pub fn parse_boot_time(content: &str) -> ParseResult<i64> {
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("btime ") {
            return value
                .trim()
                .parse()
                .map_err(|e| ParseError::Parse(format!("btime: {}", e)));
        }
    }
    Err(ParseError::MissingField("btime".to_string()))
}

/// The fields of /proc/{pid}/stat needed for service metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub state: char,
    pub utime: u64,
    pub stime: u64,
    /// Clock ticks after boot at which the process started
    pub starttime: u64,
    /// Resident set size in pages
    pub rss: u64,
}

impl ProcStat {
    pub fn cpu_ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

/// Parse /proc/{pid}/stat
pub fn parse_proc_stat(content: &str) -> ParseResult<ProcStat> {
    // Format: pid (comm) state ppid ... utime stime ... starttime vsize rss
    // comm may contain spaces and parentheses, so split on the last ')'

    let start = content.find('(').ok_or_else(|| ParseError::Parse("No ( found".to_string()))?;
    let end = content.rfind(')').ok_or_else(|| ParseError::Parse("No ) found".to_string()))?;

    let pid_str = content[..start].trim();
    let parts: Vec<&str> = content[end + 1..].split_whitespace().collect();
    if parts.len() < 22 {
        return Err(ParseError::Parse("Incomplete proc stat".to_string()));
    }

    let field = |index: usize, name: &str| -> ParseResult<u64> {
        parts[index]
            .parse()
            .map_err(|e| ParseError::Parse(format!("{}: {}", name, e)))
    };

    Ok(ProcStat {
        pid: pid_str.parse().map_err(|e| ParseError::Parse(format!("pid: {}", e)))?,
        state: parts[0].chars().next().unwrap_or('?'),
        utime: field(11, "utime")?,
        stime: field(12, "stime")?,
        starttime: field(19, "starttime")?,
        rss: field(21, "rss")?,
    })
}

/// Parse `systemctl show` output (`Key=Value` per line)
pub fn parse_unit_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Collapse a systemd `ActiveState` into a run state.
///
/// `activating`, `deactivating`, `failed` and anything unknown count as
/// stopped.
pub fn run_state_from_active(active_state: &str) -> RunState {
    match active_state {
        "active" | "reloading" => RunState::Running,
        _ => RunState::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uptime() {
        let content = "12345.67 98765.43\n";
        let uptime = parse_uptime(content).unwrap();
        assert!((uptime - 12345.67).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_boot_time() {
        let content = "cpu  1000 100 500 10000 200 50 30 0\nintr 12345\nbtime 1700000000\nprocesses 999\n";
        assert_eq!(parse_boot_time(content).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_parse_boot_time_missing() {
        assert!(matches!(
            parse_boot_time("cpu 1 2 3\n"),
            Err(ParseError::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_proc_stat_with_spaces_in_comm() {
        let content = "4242 (pos (server) x) S 1 4242 4242 0 -1 4194560 1000 0 0 0 \
                       150 50 0 0 20 0 4 0 98765 123456789 2560 18446744073709551615\n";
        let stat = parse_proc_stat(content).unwrap();
        assert_eq!(stat.pid, 4242);
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.utime, 150);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.cpu_ticks(), 200);
        assert_eq!(stat.starttime, 98765);
        assert_eq!(stat.rss, 2560);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        assert!(parse_proc_stat("1 (init) S 0 1 1").is_err());
    }

    #[test]
    fn test_parse_unit_properties() {
        let props = parse_unit_properties("LoadState=loaded\nActiveState=active\nMainPID=812\n");
        assert_eq!(props.get("LoadState").map(String::as_str), Some("loaded"));
        assert_eq!(props.get("ActiveState").map(String::as_str), Some("active"));
        assert_eq!(props.get("MainPID").map(String::as_str), Some("812"));
    }

    #[test]
    fn test_run_state_collapses_transitional_states() {
        assert_eq!(run_state_from_active("active"), RunState::Running);
        assert_eq!(run_state_from_active("reloading"), RunState::Running);
        assert_eq!(run_state_from_active("activating"), RunState::Stopped);
        assert_eq!(run_state_from_active("deactivating"), RunState::Stopped);
        assert_eq!(run_state_from_active("failed"), RunState::Stopped);
        assert_eq!(run_state_from_active("inactive"), RunState::Stopped);
    }
}
