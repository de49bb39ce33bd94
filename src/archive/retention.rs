//! Archive retention
//!
//! Deletes archive entries of one schema whose archival time is older than
//! the retention window. The archival time is the later of the entry's mtime
//! and the `_imported_` stamp in its name, so an entry whose mtime could not
//! be reset on archive still gets a full window. There is no "keep at least one" rule:
//! when every entry is past the window, every entry goes. Deletion failures
//! are collected and skipped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::ArchivedName;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Retention policy for archived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum age in days, measured from archival time
    pub max_age_days: u32,
    /// Dry-run mode (log but don't delete)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 14,
            dry_run: false,
        }
    }
}

impl RetentionPolicy {
    /// Create an age-based retention policy.
    pub fn keep_days(days: u32) -> Self {
        Self {
            max_age_days: days,
            dry_run: false,
        }
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// The retention window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * SECONDS_PER_DAY)
    }
}

/// Result of one retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    /// Number of archive entries scanned
    pub scanned: usize,
    /// Number of entries deleted (or that would be, in dry-run)
    pub deleted: usize,
    /// Bytes reclaimed
    pub bytes_reclaimed: u64,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}

/// One archived artifact.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: ArchivedName,
    pub archived_at: Option<SystemTime>,
    pub size_bytes: u64,
}

impl ArchiveEntry {
    /// Age relative to `now`; `None` when the archival time is unknown or in the future
    pub fn age(&self, now: SystemTime) -> Option<Duration> {
        self.archived_at.and_then(|t| now.duration_since(t).ok())
    }
}

/// List the schema's archive entries, newest import first.
///
/// A missing archive directory is treated as empty.
pub fn list_archive(archive_dir: &Path, schema: &str) -> io::Result<Vec<ArchiveEntry>> {
    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|n| ArchivedName::parse(schema, n)) else {
            continue;
        };
        let archived_at = [metadata.modified().ok(), name.imported_at()]
            .into_iter()
            .flatten()
            .max();
        found.push(ArchiveEntry {
            path: entry.path(),
            name,
            archived_at,
            size_bytes: metadata.len(),
        });
    }

    found.sort_by(|a, b| b.name.imported_stamp.cmp(&a.name.imported_stamp));
    Ok(found)
}

/// Retention manager for one schema's archive.
pub struct Retention {
    archive_dir: PathBuf,
    schema: String,
    policy: RetentionPolicy,
}

impl Retention {
    pub fn new(archive_dir: impl Into<PathBuf>, schema: &str, policy: RetentionPolicy) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            schema: schema.to_string(),
            policy,
        }
    }

    /// Run a retention pass against the current time.
    pub fn run(&self) -> io::Result<PruneResult> {
        self.run_at(SystemTime::now())
    }

    /// Run a retention pass as if the current time were `now`.
    pub fn run_at(&self, now: SystemTime) -> io::Result<PruneResult> {
        self.prune(now, |path| fs::remove_file(path))
    }

    fn prune<F>(&self, now: SystemTime, mut remove: F) -> io::Result<PruneResult>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let mut result = PruneResult::default();
        let entries = list_archive(&self.archive_dir, &self.schema)?;
        result.scanned = entries.len();

        let window = self.policy.window();
        for entry in entries {
            let expired = entry.age(now).map(|age| age > window).unwrap_or(false);
            if !expired {
                continue;
            }

            if self.policy.dry_run {
                info!(
                    path = %entry.path.display(),
                    bytes = entry.size_bytes,
                    "DRY-RUN: would delete archive entry"
                );
            } else {
                match remove(&entry.path) {
                    Ok(()) => {
                        info!(
                            path = %entry.path.display(),
                            bytes = entry.size_bytes,
                            "deleted archive entry"
                        );
                    }
                    Err(e) => {
                        warn!(
                            path = %entry.path.display(),
                            error = %e,
                            "failed to delete archive entry"
                        );
                        result
                            .errors
                            .push(format!("Failed to delete {}: {}", entry.path.display(), e));
                        continue;
                    }
                }
            }

            result.deleted += 1;
            result.bytes_reclaimed += entry.size_bytes;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::format_stamp;
    use chrono::Local;
    use std::fs::File;
    use tempfile::TempDir;

    const DAY: u64 = SECONDS_PER_DAY;

    fn archived(dir: &Path, imported: &str, age_days: u64) -> PathBuf {
        let path = dir.join(format!("news_20240101_020000.sql_imported_{}.gz", imported));
        fs::write(&path, b"0123456789").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(age_days * DAY))
            .unwrap();
        path
    }

    #[test]
    fn test_retention_policy_default() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_age_days, 14);
        assert!(!policy.dry_run);
        assert_eq!(policy.window(), Duration::from_secs(14 * DAY));
    }

    #[test]
    fn test_prune_deletes_only_expired() {
        let dir = TempDir::new().unwrap();
        let old = archived(dir.path(), "20240101_030000", 30);
        let young = archived(dir.path(), "20240120_030000", 3);

        let result = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14))
            .run()
            .unwrap();

        assert_eq!(result.scanned, 2);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.bytes_reclaimed, 10);
        assert!(!old.exists());
        assert!(young.exists());
    }

    #[test]
    fn test_import_stamp_protects_entry_with_stale_mtime() {
        let dir = TempDir::new().unwrap();
        let yesterday = Local::now().naive_local() - chrono::Duration::days(1);
        let entry = archived(dir.path(), &format_stamp(yesterday), 30);

        let result = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14))
            .run()
            .unwrap();

        assert_eq!(result.scanned, 1);
        assert_eq!(result.deleted, 0);
        assert!(entry.exists());

        let listed = list_archive(dir.path(), "news").unwrap();
        let age = listed[0].age(SystemTime::now()).unwrap();
        assert!(age < Duration::from_secs(2 * DAY));
    }

    #[test]
    fn test_delete_failure_is_recorded_and_skipped() {
        let dir = TempDir::new().unwrap();
        let stuck = archived(dir.path(), "20240101_030000", 40);
        let gone = archived(dir.path(), "20240102_030000", 30);
        let young = archived(dir.path(), "20240120_030000", 3);
        let retention = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14));

        let result = retention
            .prune(SystemTime::now(), |path| {
                if path == stuck {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
                } else {
                    fs::remove_file(path)
                }
            })
            .unwrap();

        assert_eq!(result.scanned, 3);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("read-only"));
        assert!(stuck.exists());
        assert!(!gone.exists());
        assert!(young.exists());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let dir = TempDir::new().unwrap();
        archived(dir.path(), "20240101_030000", 30);
        archived(dir.path(), "20240120_030000", 3);
        let retention = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14));

        assert_eq!(retention.run().unwrap().deleted, 1);
        let second = retention.run().unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.deleted, 0);
    }

    #[test]
    fn test_prune_removes_last_entry_when_expired() {
        let dir = TempDir::new().unwrap();
        archived(dir.path(), "20240101_030000", 30);

        let result = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14))
            .run()
            .unwrap();
        assert_eq!(result.deleted, 1);
        assert!(list_archive(dir.path(), "news").unwrap().is_empty());
    }

    #[test]
    fn test_window_advances_with_time() {
        let dir = TempDir::new().unwrap();
        let entry = archived(dir.path(), "20240120_030000", 10);
        let retention = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(14));

        assert_eq!(retention.run().unwrap().deleted, 0);
        let later = SystemTime::now() + Duration::from_secs(5 * DAY);
        assert_eq!(retention.run_at(later).unwrap().deleted, 1);
        assert!(!entry.exists());
    }

    #[test]
    fn test_dry_run_keeps_files() {
        let dir = TempDir::new().unwrap();
        let old = archived(dir.path(), "20240101_030000", 30);

        let result = Retention::new(
            dir.path(),
            "news",
            RetentionPolicy::keep_days(14).with_dry_run(),
        )
        .run()
        .unwrap();

        assert_eq!(result.deleted, 1);
        assert!(old.exists());
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, b"keep me").unwrap();
        File::options()
            .write(true)
            .open(&foreign)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(400 * DAY))
            .unwrap();
        let other_schema = dir.path().join("other_20240101_020000.sql_imported_20240101_030000.gz");
        fs::write(&other_schema, b"x").unwrap();

        let result = Retention::new(dir.path(), "news", RetentionPolicy::keep_days(1))
            .run()
            .unwrap();

        assert_eq!(result.scanned, 0);
        assert!(foreign.exists());
        assert!(other_schema.exists());
    }

    #[test]
    fn test_missing_archive_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let result = Retention::new(dir.path().join("none"), "news", RetentionPolicy::default())
            .run()
            .unwrap();
        assert_eq!(result.scanned, 0);
    }
}
