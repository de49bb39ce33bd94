//! Delivery into a locally mounted landing directory

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::{artifact_file_name, partial_name, Delivery, Transport, TransportError, TransportResult};
use crate::artifact::HashingWriter;

/// Copies artifacts into a directory visible on this host (shared storage,
/// or source and destination on the same machine).
pub struct DirectoryTransport {
    landing_dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(landing_dir: impl Into<PathBuf>) -> Self {
        Self {
            landing_dir: landing_dir.into(),
        }
    }
}

impl Transport for DirectoryTransport {
    fn describe(&self) -> String {
        self.landing_dir.display().to_string()
    }

    fn deliver(&self, artifact: &Path, sha256: &str) -> TransportResult<Delivery> {
        let file_name = artifact_file_name(artifact)?;
        fs::create_dir_all(&self.landing_dir)?;
        let target = self.landing_dir.join(&file_name);
        if target.exists() {
            return Err(TransportError::DestinationExists(target.display().to_string()));
        }

        let temp = tempfile::Builder::new()
            .prefix(&format!("{}.", partial_name(&file_name)))
            .tempfile_in(&self.landing_dir)?;

        let mut source = File::open(artifact)?;
        let mut writer = HashingWriter::new(BufWriter::new(temp.as_file()));
        io::copy(&mut source, &mut writer)?;
        let (mut buffered, copied_sha, bytes) = writer.finish();
        buffered.flush()?;
        drop(buffered);

        if !copied_sha.eq_ignore_ascii_case(sha256) {
            return Err(TransportError::ChecksumMismatch {
                name: file_name,
                expected: sha256.to_string(),
                actual: copied_sha,
            });
        }

        temp.as_file().sync_all()?;
        temp.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                TransportError::DestinationExists(target.display().to_string())
            } else {
                TransportError::Io(e.error)
            }
        })?;

        let destination = target.display().to_string();
        info!(destination = %destination, bytes, "artifact delivered");
        Ok(Delivery { destination, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::sha256_file;
    use tempfile::TempDir;

    #[test]
    fn test_directory_delivery() {
        let dir = TempDir::new().unwrap();
        let landing = dir.path().join("landing");
        fs::create_dir(&landing).unwrap();
        let artifact = dir.path().join("news_20240101_020000.sql.gz");
        fs::write(&artifact, b"gzip bytes").unwrap();
        let (sha, _) = sha256_file(&artifact).unwrap();

        let transport = DirectoryTransport::new(&landing);
        let delivery = transport.deliver(&artifact, &sha).unwrap();

        assert_eq!(delivery.bytes, 10);
        let names: Vec<_> = fs::read_dir(&landing)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["news_20240101_020000.sql.gz".to_string()]);
    }

    #[test]
    fn test_checksum_mismatch_removes_partial() {
        let dir = TempDir::new().unwrap();
        let landing = dir.path().join("landing");
        fs::create_dir(&landing).unwrap();
        let artifact = dir.path().join("news_20240101_020000.sql.gz");
        fs::write(&artifact, b"gzip bytes").unwrap();

        let err = DirectoryTransport::new(&landing)
            .deliver(&artifact, "deadbeef")
            .unwrap_err();

        assert!(matches!(err, TransportError::ChecksumMismatch { .. }));
        assert_eq!(fs::read_dir(&landing).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_landing_is_created() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("news_20240101_020000.sql.gz");
        fs::write(&artifact, b"gzip bytes").unwrap();
        let (sha, _) = sha256_file(&artifact).unwrap();
        let landing = dir.path().join("incoming");

        DirectoryTransport::new(&landing).deliver(&artifact, &sha).unwrap();
        assert!(landing.join("news_20240101_020000.sql.gz").exists());
    }

    #[test]
    fn test_unwritable_destination_is_error() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("news_20240101_020000.sql.gz");
        fs::write(&artifact, b"gzip bytes").unwrap();

        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let err = DirectoryTransport::new(&blocker)
            .deliver(&artifact, "00")
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
