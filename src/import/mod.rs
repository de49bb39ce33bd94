//! Snapshot importer
//!
//! Decompresses the selected artifact into a private temp file and hands that
//! file to the engine in one client invocation. The whole artifact is
//! decompressed before the engine is touched, so a corrupt artifact never
//! reaches the database. The temp file is deleted when the handle drops, on
//! success and on every error path.

mod verify;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::LandingArtifact;
use crate::engine::{EngineError, SqlClient};

pub use verify::{Verifier, VerifyOutcome, VerifyReport};

/// Importer errors
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot open artifact {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt artifact {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact {0} decompressed to zero bytes")]
    Empty(PathBuf),

    #[error("scratch file error: {0}")]
    Scratch(#[source] io::Error),

    #[error("engine apply failed: {0}")]
    Apply(#[source] EngineError),
}

impl ImportError {
    /// True for errors caused by the artifact's content rather than the environment
    pub fn is_data_error(&self) -> bool {
        matches!(self, ImportError::Corrupt { .. } | ImportError::Empty(_))
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

/// Statistics for one applied artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStats {
    /// Decompressed SQL bytes applied
    pub sql_bytes: u64,
}

/// Applies landing artifacts to the live engine.
pub struct Importer<'a> {
    client: &'a dyn SqlClient,
    scratch_dir: PathBuf,
}

impl<'a> Importer<'a> {
    /// Create an importer that decompresses into the system temp directory
    pub fn new(client: &'a dyn SqlClient) -> Self {
        Self {
            client,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Decompress into `dir` instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Decompress and apply `artifact`.
    pub fn import(&self, artifact: &LandingArtifact) -> ImportResult<ImportStats> {
        let mut scratch = tempfile::Builder::new()
            .prefix(".snapshot-relay-")
            .suffix(".sql")
            .tempfile_in(&self.scratch_dir)
            .map_err(ImportError::Scratch)?;
        debug!(scratch = %scratch.path().display(), "decompressing");

        let sql_bytes = decompress(&artifact.path, scratch.as_file_mut())?;
        if sql_bytes == 0 {
            return Err(ImportError::Empty(artifact.path.clone()));
        }
        info!(artifact = %artifact.name, sql_bytes, "artifact decompressed");

        self.client
            .apply_script(scratch.path())
            .map_err(ImportError::Apply)?;

        info!(artifact = %artifact.name, "artifact applied");
        Ok(ImportStats { sql_bytes })
    }
}

/// Decompress `path` into `out`, separating decode failures from write failures.
fn decompress(path: &Path, out: &mut File) -> ImportResult<u64> {
    let input = File::open(path).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(out);
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ImportError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        writer.write_all(&buf[..n]).map_err(ImportError::Scratch)?;
        total += n as u64;
    }

    writer.flush().map_err(ImportError::Scratch)?;
    Ok(total)
}
