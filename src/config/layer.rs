//! Partial configuration layers
//!
//! The TOML file, the environment and the CLI each produce a `ConfigLayer`;
//! layers are merged field by field with the later layer winning.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ConfigError, ConfigResult};

/// One partial configuration layer (TOML file shape)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub schema: Option<String>,
    pub staging_dir: Option<PathBuf>,
    pub landing_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub lock_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub retention_days: Option<u32>,
    pub lock_timeout_seconds: Option<u64>,
    pub keep_local: Option<bool>,
    pub compression_level: Option<u32>,
    #[serde(default)]
    pub source: EngineLayer,
    #[serde(default)]
    pub destination: EngineLayer,
    #[serde(default)]
    pub remote: RemoteLayer,
}

/// Engine endpoint section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineLayer {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

/// Remote delivery section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteLayer {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub key_path: Option<PathBuf>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a layer from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `higher` on top of `self`
    pub fn merge(self, higher: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            schema: higher.schema.or(self.schema),
            staging_dir: higher.staging_dir.or(self.staging_dir),
            landing_dir: higher.landing_dir.or(self.landing_dir),
            archive_dir: higher.archive_dir.or(self.archive_dir),
            lock_dir: higher.lock_dir.or(self.lock_dir),
            scratch_dir: higher.scratch_dir.or(self.scratch_dir),
            retention_days: higher.retention_days.or(self.retention_days),
            lock_timeout_seconds: higher.lock_timeout_seconds.or(self.lock_timeout_seconds),
            keep_local: higher.keep_local.or(self.keep_local),
            compression_level: higher.compression_level.or(self.compression_level),
            source: self.source.merge(higher.source),
            destination: self.destination.merge(higher.destination),
            remote: self.remote.merge(higher.remote),
        }
    }
}

impl EngineLayer {
    fn merge(self, higher: EngineLayer) -> EngineLayer {
        EngineLayer {
            host: higher.host.or(self.host),
            port: higher.port.or(self.port),
            user: higher.user.or(self.user),
            password: higher.password.or(self.password),
            connect_timeout_seconds: higher
                .connect_timeout_seconds
                .or(self.connect_timeout_seconds),
        }
    }
}

impl RemoteLayer {
    fn merge(self, higher: RemoteLayer) -> RemoteLayer {
        RemoteLayer {
            host: higher.host.or(self.host),
            user: higher.user.or(self.user),
            port: higher.port.or(self.port),
            path: higher.path.or(self.path),
            key_path: higher.key_path.or(self.key_path),
        }
    }
}

/// Merge layers in order (lowest precedence first)
pub fn merge_layers(layers: impl IntoIterator<Item = ConfigLayer>) -> ConfigLayer {
    layers
        .into_iter()
        .fold(ConfigLayer::default(), |acc, layer| acc.merge(layer))
}
