//! Shared test fixtures
//!
//! In-process stand-ins for the engine tools plus helpers that lay out
//! landing and archive directories.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use snapshot_relay::engine::{Dumper, EngineError, EngineResult, SqlClient};
use snapshot_relay::signal::SignalState;
use snapshot_relay::transport::{Delivery, Transport, TransportError, TransportResult};

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const SAMPLE_SQL: &str = "CREATE DATABASE IF NOT EXISTS `news`;\n\
USE `news`;\n\
DROP TABLE IF EXISTS `articles`;\n\
CREATE TABLE `articles` (`id` int NOT NULL, `title` varchar(255), PRIMARY KEY (`id`));\n\
INSERT INTO `articles` VALUES (1,'first'),(2,'second');\n";

/// Dumper that writes a fixed script
pub struct FakeDumper {
    pub sql: String,
}

impl FakeDumper {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
        }
    }
}

impl Dumper for FakeDumper {
    fn dump(&self, _schema: &str, sink: &mut dyn Write) -> EngineResult<u64> {
        sink.write_all(self.sql.as_bytes())
            .map_err(|source| EngineError::Stream {
                tool: "fake-dump".to_string(),
                source,
            })?;
        Ok(self.sql.len() as u64)
    }
}

/// Dumper that writes some bytes and then fails, like a dropped connection
pub struct FailingDumper;

impl Dumper for FailingDumper {
    fn dump(&self, _schema: &str, sink: &mut dyn Write) -> EngineResult<u64> {
        let _ = sink.write_all(b"-- partial dump\nCREATE TABLE");
        Err(EngineError::Failed {
            tool: "fake-dump".to_string(),
            status: "exit status: 2".to_string(),
            stderr: "Lost connection to MySQL server during query".to_string(),
        })
    }
}

/// SQL client that records applied scripts and answers the verify query
pub struct FakeSqlClient {
    applied: RefCell<Vec<String>>,
    apply_error: Option<String>,
    verify_rows: Option<Vec<Vec<String>>>,
}

impl FakeSqlClient {
    /// Healthy engine: applies succeed, schema present with 3 tables
    pub fn new() -> Self {
        Self {
            applied: RefCell::new(Vec::new()),
            apply_error: None,
            verify_rows: Some(vec![row(&["1", "3", "42"])]),
        }
    }

    /// Every apply fails with `stderr`
    pub fn failing_apply(stderr: &str) -> Self {
        Self {
            apply_error: Some(stderr.to_string()),
            ..Self::new()
        }
    }

    /// Verify query returns `rows`
    pub fn with_verify_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            verify_rows: Some(rows),
            ..Self::new()
        }
    }

    /// Verify query itself errors
    pub fn with_broken_query() -> Self {
        Self {
            verify_rows: None,
            ..Self::new()
        }
    }

    /// Scripts applied so far, in order
    pub fn applied(&self) -> Vec<String> {
        self.applied.borrow().clone()
    }
}

impl SqlClient for FakeSqlClient {
    fn apply_script(&self, script: &Path) -> EngineResult<()> {
        if let Some(ref stderr) = self.apply_error {
            return Err(EngineError::Failed {
                tool: "mysql".to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }
        let sql = fs::read_to_string(script).map_err(|source| EngineError::Stream {
            tool: "mysql".to_string(),
            source,
        })?;
        self.applied.borrow_mut().push(sql);
        Ok(())
    }

    fn query(&self, _sql: &str) -> EngineResult<Vec<Vec<String>>> {
        self.verify_rows.clone().ok_or_else(|| EngineError::Output {
            tool: "mysql".to_string(),
            detail: "ERROR 2013 (HY000): Lost connection".to_string(),
        })
    }
}

/// SQL client that receives a signal while the apply is running
pub struct InterruptedSqlClient<'a> {
    pub inner: FakeSqlClient,
    pub cancel: &'a SignalState,
}

impl SqlClient for InterruptedSqlClient<'_> {
    fn apply_script(&self, script: &Path) -> EngineResult<()> {
        self.cancel.handle_signal();
        self.inner.apply_script(script)
    }

    fn query(&self, sql: &str) -> EngineResult<Vec<Vec<String>>> {
        self.inner.query(sql)
    }
}

/// Transport whose destination is never reachable
pub struct UnreachableTransport;

impl Transport for UnreachableTransport {
    fn describe(&self) -> String {
        "relay@unreachable:/srv/landing".to_string()
    }

    fn deliver(&self, _artifact: &Path, _sha256: &str) -> TransportResult<Delivery> {
        Err(TransportError::Ssh("connection refused".to_string()))
    }
}

pub fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// gzip `data` in memory
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Decompress a gzip file into a string
pub fn gunzip_file(path: &Path) -> String {
    let mut decoder = GzDecoder::new(File::open(path).unwrap());
    let mut out = String::new();
    decoder.read_to_string(&mut out).unwrap();
    out
}

/// Write a compressed artifact named `file_name` into `dir`
pub fn write_artifact(dir: &Path, file_name: &str, sql: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, gzip(sql.as_bytes())).unwrap();
    path
}

/// Write an archive entry and backdate its mtime by `age`
pub fn write_archived(dir: &Path, file_name: &str, age: Duration) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, gzip(b"SELECT 1;\n")).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
    path
}

/// Sorted file names in `dir` (empty if missing)
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
