//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Failure kind - which step aborted the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Missing or invalid configuration (no side effects happened)
    Config,
    /// Another import cycle holds the schema lock
    LockHeld,
    /// Dump tool failed
    Dump,
    /// Delivery to the landing directory failed
    Transfer,
    /// Artifact could not be decompressed
    CorruptArtifact,
    /// Engine rejected the import
    Apply,
    /// Move into the archive failed
    Archive,
    /// Filesystem error outside a specific step
    Io,
    /// Run interrupted by a signal
    Cancelled,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Config => ExitCode::Config,
            FailureKind::LockHeld => ExitCode::LockHeld,
            FailureKind::Dump => ExitCode::Dump,
            FailureKind::Transfer => ExitCode::Transfer,
            FailureKind::CorruptArtifact => ExitCode::CorruptArtifact,
            FailureKind::Apply => ExitCode::Apply,
            FailureKind::Archive => ExitCode::Archive,
            FailureKind::Io => ExitCode::Io,
            FailureKind::Cancelled => ExitCode::Cancelled,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Config => "configuration error",
            FailureKind::LockHeld => "another import cycle is running",
            FailureKind::Dump => "snapshot dump failed",
            FailureKind::Transfer => "artifact transfer failed",
            FailureKind::CorruptArtifact => "artifact is corrupt",
            FailureKind::Apply => "database import failed",
            FailureKind::Archive => "archiving failed",
            FailureKind::Io => "filesystem error",
            FailureKind::Cancelled => "run cancelled",
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Success, including "nothing to do"
    Success = 0,
    /// Configuration error
    Config = 10,
    /// Schema lock held by another cycle
    LockHeld = 11,
    /// Dump failure
    Dump = 20,
    /// Transfer failure
    Transfer = 30,
    /// Corrupt artifact
    CorruptArtifact = 40,
    /// Engine apply failure
    Apply = 50,
    /// Archive move failure
    Archive = 60,
    /// Filesystem error
    Io = 70,
    /// Cancelled by signal
    Cancelled = 80,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FailureKind; 9] = [
        FailureKind::Config,
        FailureKind::LockHeld,
        FailureKind::Dump,
        FailureKind::Transfer,
        FailureKind::CorruptArtifact,
        FailureKind::Apply,
        FailureKind::Archive,
        FailureKind::Io,
        FailureKind::Cancelled,
    ];

    #[test]
    fn test_every_failure_has_distinct_nonzero_code() {
        let mut codes: Vec<i32> = ALL.iter().map(|k| k.exit_code().as_i32()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(FailureKind::Config.exit_code().as_i32(), 10);
        assert_eq!(FailureKind::LockHeld.exit_code().as_i32(), 11);
        assert_eq!(FailureKind::Transfer.exit_code().as_i32(), 30);
        assert_eq!(FailureKind::Archive.exit_code().as_i32(), 60);
        assert_eq!(FailureKind::Cancelled.exit_code().as_i32(), 80);
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_string(&FailureKind::CorruptArtifact).unwrap();
        assert_eq!(json, "\"CORRUPT_ARTIFACT\"");
    }
}
