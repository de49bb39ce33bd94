//! Configuration
//!
//! Settings are resolved from four layers, later layers winning per field:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`)
//! 3. Environment variables
//! 4. CLI flags

mod defaults;
mod env;
mod layer;
mod settings;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::NameError;

pub use defaults::BuiltinDefaults;
pub use env::{env_layer, EnvSource, ProcessEnv, DESTINATION_PASSWORD_VAR, SOURCE_PASSWORD_VAR};
pub use layer::{merge_layers, ConfigLayer, EngineLayer, RemoteLayer};
pub use settings::{ConfigOrigin, ConfigSource, EngineSettings, RemoteSettings, Settings};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("missing credential: set {key}")]
    MissingCredential { key: String },

    #[error("remote delivery is partially configured; missing {missing}")]
    IncompleteRemote { missing: String },

    #[error(transparent)]
    InvalidSchema(#[from] NameError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
