//! Import cycle locking
//!
//! At most one import cycle may run per schema. The cycle holds an advisory
//! `flock` on `snapshot-relay.<schema>.lock` from selection until pruning is
//! done. The lock is released when the guard drops, including on error paths;
//! a crashed process releases it when its file descriptor closes.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another import cycle holds {path} (waited {waited:?})")]
    Held { path: PathBuf, waited: Duration },

    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive per-schema import lock.
pub struct CycleLock {
    /// Path to the lock file
    lock_path: PathBuf,
    /// The opened lock file (held for the lock duration)
    lock_file: File,
}

impl CycleLock {
    /// Lock file name for `schema`
    pub fn file_name(schema: &str) -> String {
        format!("snapshot-relay.{}.lock", schema)
    }

    /// Acquire the lock for `schema` in `lock_dir`.
    ///
    /// Creates the directory and lock file if they don't exist. Waits up to
    /// `timeout` for a competing holder; a zero timeout tries exactly once.
    pub fn acquire(lock_dir: &Path, schema: &str, timeout: Duration) -> LockResult<Self> {
        let lock_path = lock_dir.join(Self::file_name(schema));
        fs::create_dir_all(lock_dir).map_err(|source| LockError::Io {
            path: lock_path.clone(),
            source,
        })?;

        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);
        let mut warned = false;

        loop {
            match Self::try_acquire_exclusive(&lock_path) {
                Ok(file) => {
                    if warned {
                        warn!(
                            path = %lock_path.display(),
                            waited_secs = start.elapsed().as_secs_f64(),
                            "lock acquired after contention"
                        );
                    }
                    debug!(path = %lock_path.display(), "cycle lock acquired");
                    return Ok(Self {
                        lock_path,
                        lock_file: file,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > Duration::from_millis(500) {
                        warn!(path = %lock_path.display(), "lock contention, waiting");
                        warned = true;
                    }
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: lock_path,
                        source,
                    })
                }
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Held {
                    path: lock_path,
                    waited: start.elapsed(),
                });
            }

            std::thread::sleep(poll_interval);
        }
    }

    /// Try to acquire an exclusive lock on the file.
    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(lock_path)?;

        // SAFETY: fd is a valid descriptor owned by `file` for this call
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    /// Try to acquire an exclusive lock on the file (non-Unix fallback).
    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor stays open until `lock_file` drops after this
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.lock_path);
        }
        debug!(path = %self.lock_path.display(), "cycle lock released");
    }
}
