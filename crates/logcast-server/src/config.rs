use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors from loading [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    pub stream_path: String,
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9092,
            stream_path: "/logs/stream".into(),
            heartbeat_interval_secs: 15,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then the optional JSON file, then `LOGCAST_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(host) = lookup("LOGCAST_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("LOGCAST_PORT") {
            self.port = parse_value("LOGCAST_PORT", &port)?;
        }
        if let Some(path) = lookup("LOGCAST_STREAM_PATH") {
            self.stream_path = path;
        }
        if let Some(secs) = lookup("LOGCAST_HEARTBEAT_SECS") {
            self.heartbeat_interval_secs = parse_value("LOGCAST_HEARTBEAT_SECS", &secs)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "heartbeat_interval_secs",
                value: "0".into(),
            });
        }
        if !self.stream_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "stream_path",
                value: self.stream_path.clone(),
            });
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}
