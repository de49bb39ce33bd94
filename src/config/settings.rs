//! Resolved settings
//!
//! The merged layers are validated once here; everything downstream takes
//! `Settings` as given.

use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use super::defaults::BuiltinDefaults;
use super::env::{env_layer, EnvSource, DESTINATION_PASSWORD_VAR, SOURCE_PASSWORD_VAR};
use super::layer::{merge_layers, ConfigLayer, EngineLayer, RemoteLayer};
use super::{ConfigError, ConfigResult};
use crate::archive::RetentionPolicy;
use crate::artifact::validate_schema;
use crate::engine::ConnectionParams;
use crate::transport::SshConfig;

const REDACTED: &str = "[REDACTED]";

/// Where a configuration layer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing layer, in precedence order
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// One engine endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(serialize_with = "redact")]
    pub password: Option<String>,
    pub connect_timeout_seconds: u64,
}

/// Remote delivery target
#[derive(Debug, Clone, Serialize)]
pub struct RemoteSettings {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub schema: String,
    pub staging_dir: PathBuf,
    pub landing_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub retention_days: u32,
    pub lock_timeout_seconds: u64,
    pub keep_local: bool,
    pub compression_level: u32,
    pub source: EngineSettings,
    pub destination: EngineSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSettings>,
    pub sources: Vec<ConfigSource>,
}

fn redact<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_str(REDACTED),
        None => serializer.serialize_none(),
    }
}

impl Settings {
    /// Resolve settings from an optional config file, the environment and CLI flags
    pub fn load(
        config_path: Option<&Path>,
        env: &dyn EnvSource,
        cli: ConfigLayer,
    ) -> ConfigResult<Self> {
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
        }];
        let mut layers = Vec::with_capacity(3);

        if let Some(path) = config_path {
            layers.push(ConfigLayer::from_file(path)?);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_path_buf()),
            });
        }

        layers.push(env_layer(env)?);
        sources.push(ConfigSource {
            origin: ConfigOrigin::Env,
            path: None,
        });

        if cli != ConfigLayer::default() {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
            });
        }

        let mut settings = Self::resolve(&BuiltinDefaults::default(), merge_layers(layers))?;
        settings.sources = sources;
        Ok(settings)
    }

    /// Apply a merged layer over the built-in defaults and validate
    pub fn resolve(defaults: &BuiltinDefaults, layer: ConfigLayer) -> ConfigResult<Self> {
        let schema = layer.schema.unwrap_or_else(|| defaults.schema.clone());
        validate_schema(&schema)?;

        let retention_days = layer.retention_days.unwrap_or(defaults.retention_days);
        if retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retention_days".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let compression_level = layer.compression_level.unwrap_or(defaults.compression_level);
        if compression_level > 9 {
            return Err(ConfigError::InvalidValue {
                key: "compression_level".to_string(),
                reason: format!("{} is outside 0-9", compression_level),
            });
        }

        Ok(Self {
            schema,
            staging_dir: layer.staging_dir.unwrap_or_else(|| defaults.staging_dir.clone()),
            landing_dir: layer.landing_dir.unwrap_or_else(|| defaults.landing_dir.clone()),
            archive_dir: layer.archive_dir.unwrap_or_else(|| defaults.archive_dir.clone()),
            lock_dir: layer.lock_dir.unwrap_or_else(|| defaults.lock_dir.clone()),
            scratch_dir: layer.scratch_dir.unwrap_or_else(|| defaults.scratch_dir.clone()),
            retention_days,
            lock_timeout_seconds: layer
                .lock_timeout_seconds
                .unwrap_or(defaults.lock_timeout_seconds),
            keep_local: layer.keep_local.unwrap_or(defaults.keep_local),
            compression_level,
            source: resolve_engine(defaults, layer.source),
            destination: resolve_engine(defaults, layer.destination),
            remote: resolve_remote(defaults, layer.remote)?,
            sources: vec![ConfigSource {
                origin: ConfigOrigin::Builtin,
                path: None,
            }],
        })
    }

    /// Connection parameters for the source engine
    pub fn source_connection(&self) -> ConfigResult<ConnectionParams> {
        connection(&self.source, SOURCE_PASSWORD_VAR)
    }

    /// Connection parameters for the destination engine
    pub fn destination_connection(&self) -> ConfigResult<ConnectionParams> {
        connection(&self.destination, DESTINATION_PASSWORD_VAR)
    }

    /// SSH settings when remote delivery is configured
    pub fn ssh_config(&self) -> Option<SshConfig> {
        self.remote.as_ref().map(|remote| SshConfig {
            host: remote.host.clone(),
            user: remote.user.clone(),
            port: remote.port,
            key_path: remote.key_path.clone(),
            remote_dir: remote.path.clone(),
            ..SshConfig::default()
        })
    }

    /// Retention policy for the archive
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::keep_days(self.retention_days)
    }
}

fn resolve_engine(defaults: &BuiltinDefaults, layer: EngineLayer) -> EngineSettings {
    EngineSettings {
        host: layer.host.unwrap_or_else(|| defaults.engine_host.clone()),
        port: layer.port.unwrap_or(defaults.engine_port),
        user: layer.user.unwrap_or_else(|| defaults.engine_user.clone()),
        password: layer.password,
        connect_timeout_seconds: layer
            .connect_timeout_seconds
            .unwrap_or(defaults.connect_timeout_seconds),
    }
}

fn resolve_remote(
    defaults: &BuiltinDefaults,
    layer: RemoteLayer,
) -> ConfigResult<Option<RemoteSettings>> {
    if layer == RemoteLayer::default() {
        return Ok(None);
    }

    let missing: Vec<&str> = [
        ("host", layer.host.is_none()),
        ("user", layer.user.is_none()),
        ("path", layer.path.is_none()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| *name)
    .collect();

    match (layer.host, layer.user, layer.path) {
        (Some(host), Some(user), Some(path)) => Ok(Some(RemoteSettings {
            host,
            user,
            port: layer.port.unwrap_or(defaults.remote_port),
            path,
            key_path: layer.key_path,
        })),
        _ => Err(ConfigError::IncompleteRemote {
            missing: missing.join(", "),
        }),
    }
}

fn connection(engine: &EngineSettings, password_var: &str) -> ConfigResult<ConnectionParams> {
    let password = engine
        .password
        .clone()
        .ok_or_else(|| ConfigError::MissingCredential {
            key: password_var.to_string(),
        })?;

    Ok(ConnectionParams {
        host: engine.host.clone(),
        port: engine.port,
        user: engine.user.clone(),
        password,
        connect_timeout_seconds: engine.connect_timeout_seconds,
    })
}
