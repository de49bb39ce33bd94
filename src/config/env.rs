//! Environment layer
//!
//! Empty variables count as unset.

use std::collections::HashMap;
use std::str::FromStr;

use super::layer::{ConfigLayer, EngineLayer, RemoteLayer};
use super::{ConfigError, ConfigResult};

/// Source of environment variables
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned().filter(|v| !v.trim().is_empty())
    }
}

/// Password variable for the source engine
pub const SOURCE_PASSWORD_VAR: &str = "SOURCE_MYSQL_PASSWORD";

/// Password variable for the destination engine
pub const DESTINATION_PASSWORD_VAR: &str = "MYSQL_PASSWORD";

fn parse<T: FromStr>(env: &dyn EnvSource, key: &str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool(env: &dyn EnvSource, key: &str) -> ConfigResult<Option<bool>> {
    match env.get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a boolean, got '{}'", other),
            }),
        },
    }
}

/// Build the environment layer
pub fn env_layer(env: &dyn EnvSource) -> ConfigResult<ConfigLayer> {
    let connect_timeout = parse::<u64>(env, "MYSQL_CONNECT_TIMEOUT")?;

    Ok(ConfigLayer {
        schema: env
            .get("SNAPSHOT_SCHEMA")
            .or_else(|| env.get("MYSQL_DATABASE")),
        staging_dir: env.get("SNAPSHOT_STAGING_DIR").map(Into::into),
        landing_dir: env.get("SNAPSHOT_LANDING_DIR").map(Into::into),
        archive_dir: env.get("SNAPSHOT_ARCHIVE_DIR").map(Into::into),
        lock_dir: env.get("SNAPSHOT_LOCK_DIR").map(Into::into),
        scratch_dir: env.get("SNAPSHOT_SCRATCH_DIR").map(Into::into),
        retention_days: parse(env, "SNAPSHOT_RETENTION_DAYS")?,
        lock_timeout_seconds: parse(env, "SNAPSHOT_LOCK_TIMEOUT")?,
        keep_local: parse_bool(env, "SNAPSHOT_KEEP_LOCAL")?,
        compression_level: parse(env, "SNAPSHOT_COMPRESSION_LEVEL")?,
        source: EngineLayer {
            host: env.get("SOURCE_MYSQL_HOST"),
            port: parse(env, "SOURCE_MYSQL_PORT")?,
            user: env.get("SOURCE_MYSQL_USER"),
            password: env.get(SOURCE_PASSWORD_VAR),
            connect_timeout_seconds: connect_timeout,
        },
        destination: EngineLayer {
            host: env.get("MYSQL_HOST"),
            port: parse(env, "MYSQL_PORT")?,
            user: env.get("MYSQL_USER"),
            password: env.get(DESTINATION_PASSWORD_VAR),
            connect_timeout_seconds: connect_timeout,
        },
        remote: RemoteLayer {
            host: env.get("REMOTE_HOST"),
            user: env.get("REMOTE_USER"),
            port: parse(env, "REMOTE_PORT")?,
            path: env.get("REMOTE_PATH"),
            key_path: env.get("REMOTE_KEY").map(Into::into),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_env_is_empty_layer() {
        let layer = env_layer(&env(&[])).unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn test_reads_engine_and_remote_vars() {
        let layer = env_layer(&env(&[
            ("MYSQL_HOST", "db"),
            ("MYSQL_PORT", "3307"),
            ("MYSQL_PASSWORD", "pw"),
            ("SOURCE_MYSQL_PASSWORD", "src-pw"),
            ("MYSQL_CONNECT_TIMEOUT", "5"),
            ("REMOTE_HOST", "dest"),
            ("REMOTE_KEY", "/keys/id"),
            ("SNAPSHOT_RETENTION_DAYS", "30"),
            ("SNAPSHOT_KEEP_LOCAL", "yes"),
        ]))
        .unwrap();

        assert_eq!(layer.destination.host.as_deref(), Some("db"));
        assert_eq!(layer.destination.port, Some(3307));
        assert_eq!(layer.destination.password.as_deref(), Some("pw"));
        assert_eq!(layer.source.password.as_deref(), Some("src-pw"));
        assert_eq!(layer.source.connect_timeout_seconds, Some(5));
        assert_eq!(layer.destination.connect_timeout_seconds, Some(5));
        assert_eq!(layer.remote.key_path, Some("/keys/id".into()));
        assert_eq!(layer.retention_days, Some(30));
        assert_eq!(layer.keep_local, Some(true));
    }

    #[test]
    fn test_schema_falls_back_to_mysql_database() {
        let layer = env_layer(&env(&[("MYSQL_DATABASE", "prices")])).unwrap();
        assert_eq!(layer.schema.as_deref(), Some("prices"));

        let layer = env_layer(&env(&[
            ("MYSQL_DATABASE", "prices"),
            ("SNAPSHOT_SCHEMA", "news"),
        ]))
        .unwrap();
        assert_eq!(layer.schema.as_deref(), Some("news"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let layer = env_layer(&env(&[("MYSQL_PASSWORD", "  ")])).unwrap();
        assert_eq!(layer.destination.password, None);
    }

    #[test]
    fn test_invalid_integer_is_error() {
        let err = env_layer(&env(&[("SNAPSHOT_RETENTION_DAYS", "two weeks")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "SNAPSHOT_RETENTION_DAYS"
        ));

        let err = env_layer(&env(&[("SNAPSHOT_KEEP_LOCAL", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
