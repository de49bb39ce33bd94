//! snapshot-relay: scheduled logical snapshots of one MySQL schema
//!
//! The source side dumps a schema into a compressed, timestamp-named artifact
//! and delivers it atomically into a landing directory. The destination side
//! imports the newest landing artifact, verifies it, archives it and prunes
//! the archive by age.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod export;
pub mod import;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod signal;
pub mod summary;
pub mod transport;

pub use artifact::{ArtifactName, LandingArtifact, Selection};
pub use config::{ConfigError, ConfigLayer, Settings};
pub use engine::{ConnectionParams, Dumper, EngineError, SqlClient};
pub use pipeline::{ExportJob, ImportCycle, PipelineError, PipelineResult};
pub use summary::{CycleReport, CycleStatus, ExitCode, ExportReport, FailureKind};
pub use transport::{DirectoryTransport, SshTransport, Transport};
