//! Artifact delivery to the landing directory
//!
//! Abstracts delivery for testability. Provides:
//! - Transport trait: interface for moving one artifact
//! - SshTransport: streams the artifact over SSH to a remote landing directory
//! - DirectoryTransport: delivers into a locally mounted landing directory
//!
//! Every transport writes under a hidden `.partial` name, checks the SHA-256,
//! and only then renames to the final name.

mod directory;
mod ssh;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub use directory::DirectoryTransport;
pub use ssh::{shell_quote, SshConfig, SshTransport};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("checksum mismatch for {name}: local {expected}, remote {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("destination already holds {0}")]
    DestinationExists(String),

    #[error("not an artifact file: {0}")]
    InvalidArtifact(PathBuf),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Where and how much was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub destination: String,
    pub bytes: u64,
}

/// Moves a finished artifact into the destination landing directory.
pub trait Transport {
    /// Human-readable destination, for logs
    fn describe(&self) -> String;

    /// Deliver `artifact` whose SHA-256 is `sha256`, preserving its file name.
    fn deliver(&self, artifact: &Path, sha256: &str) -> TransportResult<Delivery>;
}

/// The artifact's file name as UTF-8, or an error
fn artifact_file_name(artifact: &Path) -> TransportResult<String> {
    artifact
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| TransportError::InvalidArtifact(artifact.to_path_buf()))
}

/// Hidden name used while bytes are in flight
fn partial_name(file_name: &str) -> String {
    format!(".{}{}", file_name, crate::artifact::PARTIAL_SUFFIX)
}

/// Hidden in-flight name unique to one delivery attempt.
///
/// Overlapping deliveries of the same artifact never share a partial file.
fn unique_partial_name(file_name: &str) -> String {
    static ATTEMPT: AtomicU64 = AtomicU64::new(0);
    let attempt = ATTEMPT.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "{}.{}-{}-{:09}",
        partial_name(file_name),
        std::process::id(),
        attempt,
        nanos
    )
}
