//! Machine-readable run reports

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::failure::FailureKind;
use crate::archive::PruneResult;
use crate::import::VerifyReport;

/// Final state of an import cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Landing held no artifact for the schema
    NothingToDo,
    /// Imported, verified and archived
    Imported,
    /// Imported and archived, but verification raised a warning
    ImportedWithWarnings,
}

/// Outcome of one import cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub schema: String,
    pub status: CycleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_warning: Option<String>,
    /// Older artifacts left in landing, newest first
    pub backlog: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune: Option<PruneResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    /// Report for a cycle that found nothing to import
    pub fn nothing_to_do(schema: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            schema: schema.to_string(),
            status: CycleStatus::NothingToDo,
            artifact: None,
            sql_bytes: None,
            archived_to: None,
            verify: None,
            verify_warning: None,
            backlog: Vec::new(),
            prune: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// One-paragraph human summary
    pub fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match self.status {
            CycleStatus::NothingToDo => {
                lines.push(format!("{}: nothing to import", self.schema));
            }
            CycleStatus::Imported | CycleStatus::ImportedWithWarnings => {
                lines.push(format!(
                    "{}: imported {}",
                    self.schema,
                    self.artifact.as_deref().unwrap_or("?")
                ));
                if let Some(ref path) = self.archived_to {
                    lines.push(format!("  Archived: {}", path.display()));
                }
                if let Some(ref report) = self.verify {
                    lines.push(format!(
                        "  Verified: {} tables, ~{} rows",
                        report.tables, report.approx_rows
                    ));
                }
                if let Some(ref warning) = self.verify_warning {
                    lines.push(format!("  WARNING: {}", warning));
                }
            }
        }
        if !self.backlog.is_empty() {
            lines.push(format!("  Backlog left in landing: {}", self.backlog.join(", ")));
        }
        if let Some(ref prune) = self.prune {
            lines.push(format!(
                "  Retention: {} scanned, {} deleted, {} errors",
                prune.scanned,
                prune.deleted,
                prune.errors.len()
            ));
        }
        lines.join("\n")
    }
}

/// Outcome of one export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub schema: String,
    pub artifact: String,
    pub path: PathBuf,
    pub dump_bytes: u64,
    pub compressed_bytes: u64,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_to: Option<String>,
    /// Staging copy removed after a verified delivery
    pub staging_removed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExportReport {
    pub fn to_human(&self) -> String {
        let mut lines = vec![
            format!("{}: exported {}", self.schema, self.artifact),
            format!(
                "  Size: {} bytes compressed ({} bytes SQL)",
                self.compressed_bytes, self.dump_bytes
            ),
            format!("  SHA-256: {}", self.sha256),
        ];
        match self.delivered_to {
            Some(ref dest) => lines.push(format!("  Delivered: {}", dest)),
            None => lines.push(format!("  Local only: {}", self.path.display())),
        }
        lines.join("\n")
    }
}

/// One landing or archive file in a status listing
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub file_name: String,
    pub size_bytes: u64,
    /// Seconds since creation (landing) or archival (archive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
}

/// Landing backlog and archive contents for one schema
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub schema: String,
    pub landing_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Newest first; the first entry is what the next cycle imports
    pub landing: Vec<StatusEntry>,
    /// Newest import first
    pub archive: Vec<StatusEntry>,
    pub retention_days: u32,
}

impl StatusReport {
    pub fn to_human(&self) -> String {
        let mut lines = vec![self.schema.clone()];
        lines.push(format!(
            "  Landing ({}): {} pending",
            self.landing_dir.display(),
            self.landing.len()
        ));
        for (i, entry) in self.landing.iter().enumerate() {
            let marker = if i == 0 { "next" } else { "backlog" };
            lines.push(format!("    {} [{}] {} bytes", entry.file_name, marker, entry.size_bytes));
        }
        lines.push(format!(
            "  Archive ({}): {} entries, retention {} days",
            self.archive_dir.display(),
            self.archive.len(),
            self.retention_days
        ));
        for entry in &self.archive {
            let age = entry
                .age_seconds
                .map(|s| format!("{}d", s / 86_400))
                .unwrap_or_else(|| "?".to_string());
            lines.push(format!("    {} ({} old)", entry.file_name, age));
        }
        lines.join("\n")
    }
}

/// Report printed in `--json` mode when a run aborts
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub status: &'static str,
    pub failure_kind: FailureKind,
    pub exit_code: i32,
    pub message: String,
}

impl FailureReport {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: "failed",
            failure_kind: kind,
            exit_code: kind.exit_code().as_i32(),
            message: message.into(),
        }
    }
}
