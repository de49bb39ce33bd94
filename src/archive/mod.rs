//! Archiver
//!
//! Moves an imported artifact out of the landing directory with a single
//! rename, so the artifact is always in exactly one of the two directories.
//! The rename never replaces an existing archive entry. The archived copy's
//! mtime is set to the archival instant; retention ages entries from the later
//! of that mtime and the import stamp in the name.

mod retention;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::LandingArtifact;

pub use retention::{list_archive, ArchiveEntry, PruneResult, Retention, RetentionPolicy};

/// Archiver errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive entry already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("cannot move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Moves imported artifacts into the archive directory.
pub struct Archiver {
    archive_dir: PathBuf,
}

impl Archiver {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    /// Rename `artifact` into the archive, tagged with `imported_at`.
    ///
    /// On error the artifact is untouched in the landing directory.
    pub fn archive(
        &self,
        artifact: &LandingArtifact,
        imported_at: NaiveDateTime,
    ) -> ArchiveResult<PathBuf> {
        fs::create_dir_all(&self.archive_dir).map_err(|source| ArchiveError::CreateDir {
            path: self.archive_dir.clone(),
            source,
        })?;

        let target = self
            .archive_dir
            .join(artifact.name.archived_file_name(imported_at));

        match rename_noreplace(&artifact.path, &target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ArchiveError::AlreadyExists(target));
            }
            Err(source) => {
                return Err(ArchiveError::Move {
                    from: artifact.path.clone(),
                    to: target,
                    source,
                });
            }
        }

        if let Err(e) = stamp_archival_time(&target) {
            warn!(
                path = %target.display(),
                error = %e,
                "could not set archival mtime; retention will age this entry from its import stamp"
            );
        }

        info!(artifact = %artifact.name, archived = %target.display(), "artifact archived");
        Ok(target)
    }
}

fn stamp_archival_time(path: &Path) -> io::Result<()> {
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// Rename `from` to `to`, failing with `AlreadyExists` when `to` is taken.
#[cfg(target_os = "linux")]
fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let from_c = CString::new(from.as_os_str().as_bytes())?;
    let to_c = CString::new(to.as_os_str().as_bytes())?;

    // SAFETY: both pointers are NUL-terminated strings that outlive the call
    let result = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            from_c.as_ptr(),
            libc::AT_FDCWD,
            to_c.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if result == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // Filesystem or kernel without RENAME_NOREPLACE
        Some(libc::EINVAL) | Some(libc::ENOSYS) => rename_checked(from, to),
        _ => Err(err),
    }
}

#[cfg(not(target_os = "linux"))]
fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    rename_checked(from, to)
}

/// Check-then-rename. A file created at `to` between the check and the
/// rename is replaced.
fn rename_checked(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    fs::rename(from, to)
}
