//! Snapshot artifacts
//!
//! Naming, integrity hashing and landing-directory selection. The file name is
//! the only metadata an artifact carries.

mod digest;
mod name;
mod select;

pub use digest::{compute_sha256, sha256_file, HashingWriter};
pub use name::{
    format_stamp, parse_stamp, validate_schema, ArchivedName, ArtifactName, NameError,
    ARTIFACT_SUFFIX, IMPORTED_MARKER, PARTIAL_SUFFIX, TIMESTAMP_FORMAT,
};
pub use select::{scan_landing, select_newest, LandingArtifact, Selection};
