use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::warn;
use walkdir::WalkDir;

use crate::domain::DirectoryMetrics;
use crate::ports::{ManagerError, ManagerResult};

/// Walk a directory tree on the blocking pool
pub async fn directory_metrics(path: &str) -> ManagerResult<DirectoryMetrics> {
    let root = PathBuf::from(path);
    tokio::task::spawn_blocking(move || scan_directory(&root))
        .await
        .map_err(|e| ManagerError::Io(std::io::Error::other(e)))?
}

/// Sum regular file sizes below `root` and find the newest modification time.
///
/// Unreadable subdirectories are skipped. Symlinks are not followed.
pub fn scan_directory(root: &Path) -> ManagerResult<DirectoryMetrics> {
    let root_meta = match fs::metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ManagerError::NotFound(root.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    if !root_meta.is_dir() {
        return Err(ManagerError::NotFound(format!("{} is not a directory", root.display())));
    }

    let mut total_bytes = 0u64;
    let mut file_count = 0u64;
    let mut newest: Option<SystemTime> = None;

    let entries = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        });

    for entry in entries {
        let Ok(meta) = entry.metadata() else {
            continue;
        };

        newest = newest.max(meta.modified().ok());

        if meta.is_file() {
            total_bytes += meta.len();
            file_count += 1;
        }
    }

    let metrics = DirectoryMetrics::new(total_bytes, file_count);
    Ok(match newest {
        Some(modified) => metrics.with_last_modified(DateTime::<Utc>::from(modified)),
        None => metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.bin"), vec![0u8; 50]).unwrap();

        let metrics = scan_directory(dir.path()).unwrap();
        assert_eq!(metrics.total_bytes, 150);
        assert_eq!(metrics.file_count, 2);
        assert!(metrics.last_modified.is_some());
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = scan_directory(dir.path()).unwrap();
        assert_eq!(metrics.total_bytes, 0);
        assert_eq!(metrics.file_count, 0);
    }

    #[test]
    fn test_scan_missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(matches!(scan_directory(&missing), Err(ManagerError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.bin"), vec![0u8; 10]).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big.bin"), dir.path().join("big.lnk")).unwrap();

        let metrics = scan_directory(dir.path()).unwrap();
        assert_eq!(metrics.total_bytes, 10);
        assert_eq!(metrics.file_count, 1);
    }

    #[test]
    fn test_scan_root_that_is_a_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(scan_directory(&file), Err(ManagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_metrics_runs_off_thread() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"hello").unwrap();
        let metrics = directory_metrics(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(metrics.total_bytes, 5);
    }
}
