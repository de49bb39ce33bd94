//! MySQL client-tool backend
//!
//! Passwords reach the tools through the `MYSQL_PWD` child environment so they
//! never show up in the process table.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::debug;

use super::{ConnectionParams, Dumper, EngineError, EngineResult, SqlClient};

/// `mysqldump` wrapper producing a consistent, replication-neutral dump.
pub struct MysqlDump {
    params: ConnectionParams,
    program: String,
}

impl MysqlDump {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            program: "mysqldump".to_string(),
        }
    }

    /// Use a different dump binary (path or name on `PATH`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Build mysqldump arguments
    ///
    /// `--single-transaction` gives a point-in-time view without blocking
    /// readers; `--set-gtid-purged=OFF` keeps source replication state out of
    /// the dump. `--databases` embeds `CREATE DATABASE`/`USE` so the dump can
    /// be applied to an empty server.
    pub fn build_args(&self, schema: &str) -> Vec<String> {
        let mut args = connection_args(&self.params);
        args.extend(
            [
                "--single-transaction",
                "--quick",
                "--routines",
                "--triggers",
                "--set-gtid-purged=OFF",
                "--databases",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(schema.to_string());
        args
    }
}

impl Dumper for MysqlDump {
    fn dump(&self, schema: &str, sink: &mut dyn Write) -> EngineResult<u64> {
        let args = self.build_args(schema);
        debug!(tool = %self.program, ?args, "spawning dump");

        let mut child = Command::new(&self.program)
            .args(&args)
            .env("MYSQL_PWD", &self.params.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                tool: self.program.clone(),
                source,
            })?;

        let stderr = drain_stderr(&mut child);

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, sink),
            None => Ok(0),
        };

        if copied.is_err() {
            // Sink failed; stop the dump instead of letting it block on a full pipe
            let _ = child.kill();
        }

        let status = child.wait().map_err(|source| EngineError::Stream {
            tool: self.program.clone(),
            source,
        })?;
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Failed {
                tool: self.program.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        copied.map_err(|source| EngineError::Stream {
            tool: self.program.clone(),
            source,
        })
    }
}

/// `mysql` command-line client wrapper.
pub struct MysqlClient {
    params: ConnectionParams,
    program: String,
}

impl MysqlClient {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            program: "mysql".to_string(),
        }
    }

    /// Use a different client binary (path or name on `PATH`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(connection_args(&self.params))
            .arg(format!(
                "--connect-timeout={}",
                self.params.connect_timeout_seconds
            ))
            .env("MYSQL_PWD", &self.params.password);
        cmd
    }

    fn spawn_error(&self, source: io::Error) -> EngineError {
        EngineError::Spawn {
            tool: self.program.clone(),
            source,
        }
    }
}

impl SqlClient for MysqlClient {
    fn apply_script(&self, script: &Path) -> EngineResult<()> {
        let input = File::open(script).map_err(|source| EngineError::Stream {
            tool: self.program.clone(),
            source,
        })?;

        debug!(tool = %self.program, script = %script.display(), "applying script");

        let output = self
            .base_command()
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn query(&self, sql: &str) -> EngineResult<Vec<Vec<String>>> {
        let output = self
            .base_command()
            .arg("--batch")
            .arg("--skip-column-names")
            .arg(format!("--execute={}", sql))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| EngineError::Output {
            tool: self.program.clone(),
            detail: e.to_string(),
        })?;

        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect())
    }
}

fn connection_args(params: &ConnectionParams) -> Vec<String> {
    vec![
        format!("--host={}", params.host),
        format!("--port={}", params.port),
        format!("--user={}", params.user),
    ]
}

/// Read a child's stderr on a helper thread so a chatty tool cannot block on a
/// full pipe while stdout is being streamed.
fn drain_stderr(child: &mut Child) -> thread::JoinHandle<String> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buf);
        }
        buf
    })
}
