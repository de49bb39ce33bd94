//! Database engine seams
//!
//! The producer, importer and verifier talk to the engine only through these
//! traits. Production uses the MySQL client tools (`mysqldump`, `mysql`);
//! tests substitute in-process fakes.

mod mysql;

use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

pub use mysql::{MysqlClient, MysqlDump};

/// Connection parameters for one engine endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout_seconds: u64,
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error while streaming {tool}: {source}")]
    Stream {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected output from {tool}: {detail}")]
    Output { tool: String, detail: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Produces a full logical dump of one schema.
pub trait Dumper {
    /// Stream the dump of `schema` into `sink`. Returns the number of
    /// uncompressed bytes written.
    fn dump(&self, schema: &str, sink: &mut dyn Write) -> EngineResult<u64>;
}

/// Applies scripts to, and queries, the live engine.
pub trait SqlClient {
    /// Apply a SQL script in one client invocation.
    fn apply_script(&self, script: &Path) -> EngineResult<()>;

    /// Run a read-only query and return its rows as text columns.
    fn query(&self, sql: &str) -> EngineResult<Vec<Vec<String>>>;
}
