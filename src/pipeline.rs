//! Pipeline orchestration
//!
//! Two entry points, one per side of the relay:
//! - export: dump -> compress -> stage -> deliver
//! - import cycle: lock -> select -> import -> verify -> archive -> prune
//!
//! Cancellation is checked between steps. An engine apply that has started
//! is allowed to finish, and the cycle then completes its archive step so a
//! committed import is never left looking unprocessed.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{Local, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive::{
    list_archive, ArchiveError, Archiver, PruneResult, Retention, RetentionPolicy,
};
use crate::artifact::{scan_landing, select_newest, Selection};
use crate::config::ConfigError;
use crate::engine::SqlClient;
use crate::export::{ProduceError, Producer};
use crate::import::{ImportError, Importer, Verifier, VerifyOutcome};
use crate::lock::{CycleLock, LockError};
use crate::signal::SignalState;
use crate::summary::{
    CycleReport, CycleStatus, ExitCode, ExportReport, FailureKind, StatusEntry, StatusReport,
};
use crate::transport::{Transport, TransportError};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Produce(#[from] ProduceError),

    #[error("transfer failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> PipelineError {
        let context = context.into();
        move |source| PipelineError::Io { context, source }
    }

    /// Classify this error
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Config(_) => FailureKind::Config,
            PipelineError::Lock(LockError::Held { .. }) => FailureKind::LockHeld,
            PipelineError::Lock(LockError::Io { .. }) => FailureKind::Io,
            PipelineError::Produce(ProduceError::Dump(_)) => FailureKind::Dump,
            PipelineError::Produce(ProduceError::Name(_)) => FailureKind::Config,
            PipelineError::Produce(_) => FailureKind::Io,
            PipelineError::Transport(_) => FailureKind::Transfer,
            PipelineError::Import(e) if e.is_data_error() => FailureKind::CorruptArtifact,
            PipelineError::Import(ImportError::Apply(_)) => FailureKind::Apply,
            PipelineError::Import(_) => FailureKind::Io,
            PipelineError::Archive(_) => FailureKind::Archive,
            PipelineError::Io { .. } => FailureKind::Io,
            PipelineError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        self.failure_kind().exit_code()
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Source-side export run
pub struct ExportJob<'a> {
    pub schema: &'a str,
    pub producer: Producer<'a>,
    /// `None` means local-only: dump and compress without transfer
    pub transport: Option<&'a dyn Transport>,
    pub keep_local: bool,
    pub cancel: &'a SignalState,
}

impl ExportJob<'_> {
    pub fn run(&self) -> PipelineResult<ExportReport> {
        let started_at = Utc::now();
        self.check_cancel()?;

        info!(
            schema = self.schema,
            staging = %self.producer.staging_dir().display(),
            "export starting"
        );
        let produced = self.producer.produce(self.schema).map_err(|e| {
            if self.cancel.is_cancel_requested() {
                PipelineError::Cancelled
            } else {
                PipelineError::Produce(e)
            }
        })?;

        let mut delivered_to = None;
        let mut staging_removed = false;

        if let Some(transport) = self.transport {
            let delivered = self.check_cancel().and_then(|()| {
                info!(
                    artifact = %produced.name,
                    destination = %transport.describe(),
                    "delivering artifact"
                );
                Ok(transport.deliver(&produced.path, &produced.sha256)?)
            });
            let delivery = match delivered {
                Ok(delivery) => delivery,
                Err(e) => {
                    // Every run dumps afresh, so an undelivered copy is never retried
                    if !self.keep_local {
                        self.remove_staged(&produced.path, "after aborted delivery");
                    }
                    return Err(e);
                }
            };
            delivered_to = Some(delivery.destination);

            if !self.keep_local {
                staging_removed = self.remove_staged(&produced.path, "after delivery");
            }
        } else {
            info!(artifact = %produced.name, "no remote configured; artifact kept in staging");
        }

        Ok(ExportReport {
            schema: self.schema.to_string(),
            artifact: produced.name.file_name(),
            path: produced.path,
            dump_bytes: produced.dump_bytes,
            compressed_bytes: produced.compressed_bytes,
            sha256: produced.sha256,
            delivered_to,
            staging_removed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn remove_staged(&self, path: &Path, when: &str) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not remove staging copy {}", when);
                false
            }
        }
    }

    fn check_cancel(&self) -> PipelineResult<()> {
        if self.cancel.is_cancel_requested() {
            warn!(schema = self.schema, "export cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Destination-side import cycle
pub struct ImportCycle<'a> {
    pub schema: &'a str,
    pub landing_dir: &'a Path,
    pub archive_dir: &'a Path,
    pub lock_dir: &'a Path,
    pub lock_timeout: Duration,
    pub scratch_dir: &'a Path,
    pub retention: RetentionPolicy,
    pub client: &'a dyn SqlClient,
    pub cancel: &'a SignalState,
}

impl ImportCycle<'_> {
    /// Run select -> import -> verify -> archive -> prune under the schema lock
    pub fn run(&self) -> PipelineResult<CycleReport> {
        let started_at = Utc::now();
        let _lock = CycleLock::acquire(self.lock_dir, self.schema, self.lock_timeout)?;

        let selection = select_newest(self.landing_dir, self.schema).map_err(PipelineError::io(
            format!("cannot scan landing directory {}", self.landing_dir.display()),
        ))?;

        let (artifact, backlog) = match selection {
            Selection::Empty => {
                info!(
                    schema = self.schema,
                    landing = %self.landing_dir.display(),
                    "nothing to import"
                );
                return Ok(CycleReport::nothing_to_do(self.schema, started_at));
            }
            Selection::Selected { artifact, backlog } => (artifact, backlog),
        };

        let backlog: Vec<String> = backlog.iter().map(|a| a.name.file_name()).collect();
        if !backlog.is_empty() {
            warn!(
                schema = self.schema,
                count = backlog.len(),
                older = %backlog.join(", "),
                "older artifacts left in landing"
            );
        }
        info!(artifact = %artifact.name, "selected artifact");

        if self.cancel.is_cancel_requested() {
            warn!(schema = self.schema, "cycle cancelled before import");
            return Err(PipelineError::Cancelled);
        }

        let stats = Importer::new(self.client)
            .with_scratch_dir(self.scratch_dir)
            .import(&artifact)
            .map_err(|e| {
                error!(
                    artifact = %artifact.name,
                    error = %e,
                    "import failed; artifact left in landing"
                );
                e
            })?;

        let outcome = Verifier::new(self.client).verify(self.schema);
        let archived_to =
            Archiver::new(self.archive_dir).archive(&artifact, Local::now().naive_local())?;

        let prune = if self.cancel.is_cancel_requested() {
            warn!(schema = self.schema, "cancelled after archive; skipping retention");
            None
        } else {
            let retention = Retention::new(self.archive_dir, self.schema, self.retention.clone());
            match retention.run() {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(
                        archive = %self.archive_dir.display(),
                        error = %e,
                        "retention pass failed"
                    );
                    None
                }
            }
        };

        let (status, verify_warning) = match outcome {
            VerifyOutcome::Passed(_) => (CycleStatus::Imported, None),
            VerifyOutcome::Warning { ref reason, .. } => {
                (CycleStatus::ImportedWithWarnings, Some(reason.clone()))
            }
        };

        Ok(CycleReport {
            schema: self.schema.to_string(),
            status,
            artifact: Some(artifact.name.file_name()),
            sql_bytes: Some(stats.sql_bytes),
            archived_to: Some(archived_to),
            verify: outcome.report().cloned(),
            verify_warning,
            backlog,
            prune,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Retention pass on its own
pub fn run_prune(
    archive_dir: &Path,
    schema: &str,
    policy: RetentionPolicy,
) -> PipelineResult<PruneResult> {
    Retention::new(archive_dir, schema, policy)
        .run()
        .map_err(PipelineError::io(format!(
            "cannot scan archive directory {}",
            archive_dir.display()
        )))
}

/// Landing backlog and archive listing for one schema
pub fn collect_status(
    schema: &str,
    landing_dir: &Path,
    archive_dir: &Path,
    retention_days: u32,
) -> PipelineResult<StatusReport> {
    let now = SystemTime::now();

    let landing = scan_landing(landing_dir, schema)
        .map_err(PipelineError::io(format!(
            "cannot scan landing directory {}",
            landing_dir.display()
        )))?
        .into_iter()
        .map(|artifact| {
            let metadata = fs::metadata(&artifact.path).ok();
            StatusEntry {
                file_name: artifact.name.file_name(),
                size_bytes: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
                age_seconds: metadata
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| now.duration_since(t).ok())
                    .map(|d| d.as_secs()),
            }
        })
        .collect();

    let archive = list_archive(archive_dir, schema)
        .map_err(PipelineError::io(format!(
            "cannot scan archive directory {}",
            archive_dir.display()
        )))?
        .into_iter()
        .map(|entry| StatusEntry {
            file_name: file_name_of(&entry.path),
            size_bytes: entry.size_bytes,
            age_seconds: entry.age(now).map(|d| d.as_secs()),
        })
        .collect();

    Ok(StatusReport {
        schema: schema.to_string(),
        landing_dir: landing_dir.to_path_buf(),
        archive_dir: archive_dir.to_path_buf(),
        landing,
        archive,
        retention_days,
    })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
