//! SSH transport
//!
//! Streams the artifact on the SSH session's stdin into a hidden partial file
//! on the destination, compares the remote SHA-256 with the local one, then
//! renames the partial file into place with a second SSH command.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info, warn};

use super::{
    artifact_file_name, unique_partial_name, Delivery, Transport, TransportError, TransportResult,
};

/// Remote exit status used when the final name is already taken
const EXIT_DESTINATION_EXISTS: i32 = 17;

/// SSH transport configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote host
    pub host: String,
    /// SSH user
    pub user: String,
    /// SSH port (default 22)
    pub port: u16,
    /// Path to SSH private key
    pub key_path: Option<PathBuf>,
    /// Landing directory on the remote host
    pub remote_dir: String,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u32,
    /// Server alive interval for detecting dead connections
    pub server_alive_interval: u32,
    /// Server alive count max
    pub server_alive_count_max: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            port: 22,
            key_path: None,
            remote_dir: String::new(),
            connect_timeout_seconds: 30,
            server_alive_interval: 15,
            server_alive_count_max: 2,
        }
    }
}

/// SSH transport for production use
pub struct SshTransport {
    config: SshConfig,
    program: String,
}

impl SshTransport {
    /// Create a new SSH transport with the given configuration
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            program: "ssh".to_string(),
        }
    }

    /// Use a different ssh binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Build SSH command arguments, followed by the remote command
    pub fn build_ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_seconds),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.config.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.config.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            self.config.port.to_string(),
        ];

        if let Some(ref key_path) = self.config.key_path {
            args.push("-i".to_string());
            args.push(expand_tilde(key_path).display().to_string());
        }

        args.push(format!("{}@{}", self.config.user, self.config.host));
        args.push(remote_command.to_string());

        args
    }

    fn remote_path(&self, file_name: &str) -> String {
        let dir = self.config.remote_dir.trim_end_matches('/');
        format!("{}/{}", dir, file_name)
    }

    /// Remote command that stores stdin in `partial` and prints its SHA-256
    pub fn upload_command(&self, partial: &str) -> String {
        let partial = shell_quote(partial);
        format!(
            "umask 077 && cat > {p} && (sha256sum < {p} 2>/dev/null || shasum -a 256 < {p})",
            p = partial
        )
    }

    /// Remote command that renames `partial` to `target` unless `target` exists
    pub fn commit_command(&self, partial: &str, target: &str) -> String {
        let (partial, target) = (shell_quote(partial), shell_quote(target));
        format!(
            "if [ -e {t} ]; then echo 'destination exists' >&2; exit {code}; fi; mv -- {p} {t}",
            t = target,
            p = partial,
            code = EXIT_DESTINATION_EXISTS
        )
    }

    fn run(&self, remote_command: &str, stdin: Stdio) -> TransportResult<Output> {
        debug!(host = %self.config.host, command = remote_command, "ssh");
        Command::new(&self.program)
            .args(self.build_ssh_args(remote_command))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TransportError::Ssh(format!("Failed to spawn SSH: {}", e)))
    }

    fn remove_partial(&self, partial: &str) {
        let command = format!("rm -f -- {}", shell_quote(partial));
        match self.run(&command, Stdio::null()) {
            Ok(output) if output.status.success() => {}
            Ok(output) => warn!(
                partial,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "could not remove remote partial file"
            ),
            Err(e) => warn!(partial, error = %e, "could not remove remote partial file"),
        }
    }
}

impl Transport for SshTransport {
    fn describe(&self) -> String {
        format!(
            "{}@{}:{}",
            self.config.user, self.config.host, self.config.remote_dir
        )
    }

    fn deliver(&self, artifact: &Path, sha256: &str) -> TransportResult<Delivery> {
        let file_name = artifact_file_name(artifact)?;
        let partial = self.remote_path(&unique_partial_name(&file_name));
        let target = self.remote_path(&file_name);

        let input = File::open(artifact)?;
        let bytes = input.metadata()?.len();

        let output = self.run(&self.upload_command(&partial), Stdio::from(input))?;
        if !output.status.success() {
            self.remove_partial(&partial);
            return Err(TransportError::Ssh(format!(
                "SSH exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let remote_sha = stdout.split_whitespace().next().unwrap_or_default();
        if !remote_sha.eq_ignore_ascii_case(sha256) {
            self.remove_partial(&partial);
            return Err(TransportError::ChecksumMismatch {
                name: file_name,
                expected: sha256.to_string(),
                actual: remote_sha.to_string(),
            });
        }

        let output = self.run(&self.commit_command(&partial, &target), Stdio::null())?;
        if !output.status.success() {
            self.remove_partial(&partial);
            if output.status.code() == Some(EXIT_DESTINATION_EXISTS) {
                return Err(TransportError::DestinationExists(target));
            }
            return Err(TransportError::Ssh(format!(
                "SSH exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let destination = format!("{}@{}:{}", self.config.user, self.config.host, target);
        info!(destination = %destination, bytes, "artifact delivered");
        Ok(Delivery { destination, bytes })
    }
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
