//! Artifact naming
//!
//! Artifact identity is carried entirely by the file name:
//! - landing/staging: `<schema>_<YYYYMMDD_HHMMSS>.sql.gz`
//! - archive: `<schema>_<YYYYMMDD_HHMMSS>.sql_imported_<YYYYMMDD_HHMMSS>.gz`
//!
//! Timestamps are zero-padded so lexical order equals chronological order.

use std::fmt;
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime, TimeZone};
use regex_lite::Regex;
use thiserror::Error;

/// strftime pattern for every timestamp embedded in a file name
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suffix of a snapshot artifact in staging or landing
pub const ARTIFACT_SUFFIX: &str = ".sql.gz";

/// Marker separating the original name from the import timestamp in the archive
pub const IMPORTED_MARKER: &str = "_imported_";

/// Suffix used for in-flight files that must never be selected
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Naming errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("invalid schema name '{0}': expected 1-64 characters of [A-Za-z0-9_]")]
    InvalidSchema(String),
}

fn schema_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("static regex"))
}

fn stamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{8}_[0-9]{6}$").expect("static regex"))
}

/// Check that a schema name is safe to embed in file names and SQL literals.
pub fn validate_schema(schema: &str) -> Result<(), NameError> {
    if schema_pattern().is_match(schema) {
        Ok(())
    } else {
        Err(NameError::InvalidSchema(schema.to_string()))
    }
}

/// Format a timestamp the way it appears in file names.
pub fn format_stamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a file-name timestamp. Rejects anything that is not a real date.
pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    if !stamp_pattern().is_match(stamp) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Identity of one snapshot artifact.
///
/// Ordering compares the timestamp text first, so `max()` over artifacts of
/// one schema is the newest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactName {
    stamp: String,
    schema: String,
}

impl ArtifactName {
    /// Name an artifact of `schema` created at `created`.
    pub fn new(schema: &str, created: NaiveDateTime) -> Result<Self, NameError> {
        validate_schema(schema)?;
        Ok(Self {
            stamp: format_stamp(created),
            schema: schema.to_string(),
        })
    }

    /// Name an artifact of `schema` created now (local time).
    pub fn now(schema: &str) -> Result<Self, NameError> {
        Self::new(schema, Local::now().naive_local())
    }

    /// Parse a landing/staging file name belonging to `schema`.
    ///
    /// Returns `None` for other schemas, temp files and anything malformed.
    pub fn parse(schema: &str, file_name: &str) -> Option<Self> {
        let rest = file_name.strip_prefix(schema)?.strip_prefix('_')?;
        let stamp = rest.strip_suffix(ARTIFACT_SUFFIX)?;
        parse_stamp(stamp)?;
        Some(Self {
            stamp: stamp.to_string(),
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The `YYYYMMDD_HHMMSS` creation stamp
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Creation time encoded in the name
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        parse_stamp(&self.stamp)
    }

    /// Final file name in staging and landing
    pub fn file_name(&self) -> String {
        format!("{}_{}{}", self.schema, self.stamp, ARTIFACT_SUFFIX)
    }

    /// Hidden in-flight name used while bytes are still being written
    pub fn partial_file_name(&self) -> String {
        format!(".{}{}", self.file_name(), PARTIAL_SUFFIX)
    }

    /// File name in the archive once imported at `imported_at`
    pub fn archived_file_name(&self, imported_at: NaiveDateTime) -> String {
        let file_name = self.file_name();
        let without_gz = file_name.strip_suffix(".gz").unwrap_or(&file_name);
        format!("{}{}{}.gz", without_gz, IMPORTED_MARKER, format_stamp(imported_at))
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// An archive file name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedName {
    pub original: ArtifactName,
    pub imported_stamp: String,
}

impl ArchivedName {
    /// Parse an archive file name belonging to `schema`.
    pub fn parse(schema: &str, file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".gz")?;
        let (original, imported_stamp) = stem.rsplit_once(IMPORTED_MARKER)?;
        parse_stamp(imported_stamp)?;
        let original = ArtifactName::parse(schema, &format!("{}.gz", original))?;
        Some(Self {
            original,
            imported_stamp: imported_stamp.to_string(),
        })
    }

    /// Import time encoded in the name, read as local time
    pub fn imported_at(&self) -> Option<SystemTime> {
        let naive = parse_stamp(&self.imported_stamp)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(SystemTime::from)
    }
}
