//! Snapshot producer
//!
//! Streams the engine dump through a gzip encoder into a hidden temp file in
//! the staging directory, then renames it to its final name. A failed dump
//! never leaves a file under the final name; the temp file is removed when
//! its handle drops.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{ArtifactName, HashingWriter, NameError, PARTIAL_SUFFIX};
use crate::engine::{Dumper, EngineError};

/// Producer errors
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("dump failed: {0}")]
    Dump(#[from] EngineError),

    #[error("staging I/O error at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// Result type for producer operations
pub type ProduceResult<T> = Result<T, ProduceError>;

/// A finished artifact in the staging directory
#[derive(Debug, Clone)]
pub struct ProducedArtifact {
    pub name: ArtifactName,
    pub path: PathBuf,
    /// Compressed size on disk
    pub compressed_bytes: u64,
    /// Uncompressed dump size
    pub dump_bytes: u64,
    /// SHA-256 of the compressed file
    pub sha256: String,
}

/// Produces compressed snapshot artifacts into a staging directory.
pub struct Producer<'a> {
    dumper: &'a dyn Dumper,
    staging_dir: PathBuf,
    compression: Compression,
}

impl<'a> Producer<'a> {
    pub fn new(dumper: &'a dyn Dumper, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            dumper,
            staging_dir: staging_dir.into(),
            compression: Compression::default(),
        }
    }

    /// Override the gzip level (0-9)
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Dump `schema` and publish it as `<schema>_<stamp>.sql.gz`.
    pub fn produce(&self, schema: &str) -> ProduceResult<ProducedArtifact> {
        let name = ArtifactName::now(schema)?;
        self.produce_named(name)
    }

    /// Dump into an explicitly named artifact.
    pub fn produce_named(&self, name: ArtifactName) -> ProduceResult<ProducedArtifact> {
        let staging_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| ProduceError::Staging { path, source }
        };

        fs::create_dir_all(&self.staging_dir).map_err(staging_err(&self.staging_dir))?;

        let final_path = self.staging_dir.join(name.file_name());
        if final_path.exists() {
            return Err(ProduceError::AlreadyExists(final_path));
        }

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name.file_name()))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.staging_dir)
            .map_err(staging_err(&self.staging_dir))?;
        debug!(temp = %temp.path().display(), "writing artifact");

        let hashing = HashingWriter::new(BufWriter::new(temp.as_file()));
        let mut encoder = GzEncoder::new(hashing, self.compression);

        let dump_bytes = self.dumper.dump(name.schema(), &mut encoder)?;

        let hashing = encoder.finish().map_err(staging_err(temp.path()))?;
        let (mut buffered, sha256, compressed_bytes) = hashing.finish();
        buffered.flush().map_err(staging_err(temp.path()))?;
        drop(buffered);
        temp.as_file().sync_all().map_err(staging_err(temp.path()))?;

        temp.persist_noclobber(&final_path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                ProduceError::AlreadyExists(final_path.clone())
            } else {
                ProduceError::Staging {
                    path: final_path.clone(),
                    source: e.error,
                }
            }
        })?;

        info!(
            artifact = %name,
            path = %final_path.display(),
            dump_bytes,
            compressed_bytes,
            "snapshot written"
        );

        Ok(ProducedArtifact {
            name,
            path: final_path,
            compressed_bytes,
            dump_bytes,
            sha256,
        })
    }
}
