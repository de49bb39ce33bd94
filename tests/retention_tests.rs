//! Archive retention tests

mod fixtures;

use snapshot_relay::archive::RetentionPolicy;
use snapshot_relay::pipeline::{collect_status, run_prune};
use tempfile::TempDir;

use fixtures::*;

#[test]
fn test_prune_deletes_only_expired_entries() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("archive");
    let old = write_archived(
        &archive,
        "news_20240101_020000.sql_imported_20240101_031500.gz",
        20 * DAY,
    );
    let young = write_archived(
        &archive,
        "news_20240110_020000.sql_imported_20240110_031500.gz",
        3 * DAY,
    );

    let result = run_prune(&archive, "news", RetentionPolicy::keep_days(14)).unwrap();

    assert_eq!(result.scanned, 2);
    assert_eq!(result.deleted, 1);
    assert!(result.errors.is_empty());
    assert!(!old.exists());
    assert!(young.exists());
}

#[test]
fn test_prune_is_idempotent() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("archive");
    write_archived(&archive, "news_20240101_020000.sql_imported_20240101_031500.gz", 20 * DAY);
    write_archived(&archive, "news_20240110_020000.sql_imported_20240110_031500.gz", 3 * DAY);

    let first = run_prune(&archive, "news", RetentionPolicy::keep_days(14)).unwrap();
    let second = run_prune(&archive, "news", RetentionPolicy::keep_days(14)).unwrap();

    assert_eq!(first.deleted, 1);
    assert_eq!(second.scanned, 1);
    assert_eq!(second.deleted, 0);
}

#[test]
fn test_dry_run_deletes_nothing() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("archive");
    let old = write_archived(
        &archive,
        "news_20240101_020000.sql_imported_20240101_031500.gz",
        20 * DAY,
    );

    let result = run_prune(
        &archive,
        "news",
        RetentionPolicy::keep_days(14).with_dry_run(),
    )
    .unwrap();

    assert_eq!(result.deleted, 1);
    assert!(old.exists());
}

#[test]
fn test_prune_leaves_other_files_alone() {
    let root = TempDir::new().unwrap();
    let archive = root.path().join("archive");
    let other_schema = write_archived(
        &archive,
        "prices_20240101_020000.sql_imported_20240101_031500.gz",
        60 * DAY,
    );
    let unrelated = write_archived(&archive, "README.txt", 60 * DAY);
    let not_imported = write_archived(&archive, "news_20240101_020000.sql.gz", 60 * DAY);

    let result = run_prune(&archive, "news", RetentionPolicy::keep_days(14)).unwrap();

    assert_eq!(result.scanned, 0);
    assert!(other_schema.exists());
    assert!(unrelated.exists());
    assert!(not_imported.exists());
}

#[test]
#[cfg(unix)]
fn test_undeletable_entry_is_reported_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    // SAFETY: geteuid has no preconditions
    if unsafe { libc::geteuid() } == 0 {
        eprintln!("skipping: directory permissions do not bind root");
        return;
    }

    let root = TempDir::new().unwrap();
    let archive = root.path().join("archive");
    let old = write_archived(
        &archive,
        "news_20240101_020000.sql_imported_20240101_031500.gz",
        20 * DAY,
    );
    std::fs::set_permissions(&archive, std::fs::Permissions::from_mode(0o555)).unwrap();

    let result = run_prune(&archive, "news", RetentionPolicy::keep_days(14));

    std::fs::set_permissions(&archive, std::fs::Permissions::from_mode(0o755)).unwrap();
    let result = result.unwrap();
    assert_eq!(result.scanned, 1);
    assert_eq!(result.deleted, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(old.exists());
}

#[test]
fn test_prune_missing_archive_is_noop() {
    let root = TempDir::new().unwrap();
    let result = run_prune(
        &root.path().join("absent"),
        "news",
        RetentionPolicy::default(),
    ).unwrap();
    assert_eq!(result.scanned, 0);
}

#[test]
fn test_status_lists_backlog_and_archive() {
    let root = TempDir::new().unwrap();
    let landing = root.path().join("incoming");
    let archive = root.path().join("archive");
    write_artifact(&landing, "news_20240102_020000.sql.gz", SAMPLE_SQL);
    write_artifact(&landing, "news_20240103_020000.sql.gz", SAMPLE_SQL);
    write_archived(&archive, "news_20240101_020000.sql_imported_20240101_031500.gz", 5 * DAY);

    let report = collect_status("news", &landing, &archive, 14).unwrap();

    let landing_names: Vec<_> = report.landing.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(
        landing_names,
        vec!["news_20240103_020000.sql.gz", "news_20240102_020000.sql.gz"]
    );
    assert_eq!(report.archive.len(), 1);
    let age_days = report.archive[0].age_seconds.unwrap() / 86_400;
    assert_eq!(age_days, 5);
}
