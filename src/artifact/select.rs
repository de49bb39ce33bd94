//! Snapshot selection in the landing directory
//!
//! Selection looks only at file names: the newest artifact is the one with
//! the lexically greatest timestamp, regardless of directory order or mtimes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::name::ArtifactName;

/// An artifact waiting in the landing directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingArtifact {
    pub name: ArtifactName,
    pub path: PathBuf,
}

/// Outcome of one selection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No artifact for the schema is waiting
    Empty,
    /// The newest artifact, plus every older one left for later cycles (newest first)
    Selected {
        artifact: LandingArtifact,
        backlog: Vec<LandingArtifact>,
    },
}

/// List the schema's artifacts in `landing_dir`, newest first.
///
/// A missing landing directory is treated as empty.
pub fn scan_landing(landing_dir: &Path, schema: &str) -> io::Result<Vec<LandingArtifact>> {
    let entries = match fs::read_dir(landing_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = ArtifactName::parse(schema, file_name) {
            found.push(LandingArtifact {
                name,
                path: entry.path(),
            });
        }
    }

    found.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(found)
}

/// Pick the single artifact to import this cycle.
pub fn select_newest(landing_dir: &Path, schema: &str) -> io::Result<Selection> {
    let mut candidates = scan_landing(landing_dir, schema)?.into_iter();
    match candidates.next() {
        None => Ok(Selection::Empty),
        Some(artifact) => Ok(Selection::Selected {
            artifact,
            backlog: candidates.collect(),
        }),
    }
}
