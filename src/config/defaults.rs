//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Schema to move (default: "news")
    pub schema: String,

    /// Source-side staging directory
    pub staging_dir: PathBuf,

    /// Destination-side landing directory
    pub landing_dir: PathBuf,

    /// Destination-side archive directory
    pub archive_dir: PathBuf,

    /// Directory holding per-schema cycle lock files
    pub lock_dir: PathBuf,

    /// Directory for decompressed scratch files
    pub scratch_dir: PathBuf,

    /// Archive retention in days (default: 14)
    pub retention_days: u32,

    /// Seconds to wait for a competing import cycle (default: 0, fail fast)
    pub lock_timeout_seconds: u64,

    /// Keep the staging copy after a verified remote delivery (default: false)
    pub keep_local: bool,

    /// gzip level (default: 6)
    pub compression_level: u32,

    /// Engine host (default: "127.0.0.1")
    pub engine_host: String,

    /// Engine port (default: 3306)
    pub engine_port: u16,

    /// Engine user (default: "root")
    pub engine_user: String,

    /// Engine connect timeout in seconds (default: 8)
    pub connect_timeout_seconds: u64,

    /// SSH port for delivery (default: 22)
    pub remote_port: u16,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            schema: "news".to_string(),
            staging_dir: PathBuf::from("/var/backups/snapshot-relay/staging"),
            landing_dir: PathBuf::from("/var/backups/snapshot-relay/incoming"),
            archive_dir: PathBuf::from("/var/backups/snapshot-relay/archive"),
            lock_dir: std::env::temp_dir(),
            scratch_dir: std::env::temp_dir(),
            retention_days: 14,
            lock_timeout_seconds: 0,
            keep_local: false,
            compression_level: 6,
            engine_host: "127.0.0.1".to_string(),
            engine_port: 3306,
            engine_user: "root".to_string(),
            connect_timeout_seconds: 8,
            remote_port: 22,
        }
    }
}
