//! Runtime configuration
//!
//! Loaded from `$XDG_CONFIG_HOME/agrisync/config.toml`. Every section has
//! working defaults so a partial file, or none at all, still yields a usable
//! configuration.

use crate::correlator::CallOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "agrisync";
const CONFIG_FILE: &str = "config.toml";

const MIN_ATTEMPT_TIMEOUT_MS: u64 = 1_000;
const MAX_ATTEMPT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    /// Capacity of the request channel between client and event loop
    pub channel_capacity: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "agrisync".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            connect_timeout_ms: 5_000,
            channel_capacity: 100,
            reconnect_delay_ms: 2_000,
        }
    }
}

/// Retry budgets for the three kinds of correlated calls
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Fetching a device configuration; only the wait is retried
    pub fetch: CallOptions,
    /// Pushing a configuration to a single device
    pub push: CallOptions,
    /// Final push of the recomputed master topology
    pub master_push: CallOptions,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            fetch: CallOptions::new(3, 1_000, false),
            push: CallOptions::new(3, 3_000, true),
            master_push: CallOptions::new(3, 3_000, true),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub broker: BrokerConfig,
    pub correlation: CorrelationConfig,
}

impl SyncConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            Self::load(path).await
        } else {
            warn!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Writes a default configuration file unless one is already present.
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io_err)? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, Self::default().to_toml()?)
            .await
            .map_err(io_err)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.host must not be empty".into()));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "broker.client_id must not be empty".into(),
            ));
        }
        if self.broker.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broker.channel_capacity must be at least 1".into(),
            ));
        }

        let budgets = [
            ("fetch", &self.correlation.fetch),
            ("push", &self.correlation.push),
            ("master_push", &self.correlation.master_push),
        ];
        for (name, options) in budgets {
            if options.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "correlation.{}.max_attempts must be at least 1",
                    name
                )));
            }
            if !(MIN_ATTEMPT_TIMEOUT_MS..=MAX_ATTEMPT_TIMEOUT_MS)
                .contains(&options.attempt_timeout_ms)
            {
                return Err(ConfigError::Invalid(format!(
                    "correlation.{}.attempt_timeout_ms must be within {}..={} ms",
                    name, MIN_ATTEMPT_TIMEOUT_MS, MAX_ATTEMPT_TIMEOUT_MS
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_round_trip() {
        let config = SyncConfig::default();
        config.validate().unwrap();

        let text = config.to_toml().unwrap();
        assert_eq!(SyncConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            [broker]
            host = "broker.farm.local"

            [correlation.fetch]
            attempt_timeout_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.host, "broker.farm.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.correlation.fetch.attempt_timeout_ms, 2000);
        assert_eq!(config.correlation.fetch.max_attempts, 3);
        assert!(config.correlation.push.retransmit_on_retry);
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        let err = SyncConfig::from_toml(
            r#"
            [correlation.push]
            attempt_timeout_ms = 60000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = SyncConfig::default();
        config.correlation.master_push.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn ensure_default_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        SyncConfig::ensure_default(&path).await.unwrap();
        let written = SyncConfig::load(&path).await.unwrap();
        assert_eq!(written, SyncConfig::default());

        tokio::fs::write(&path, "[broker]\nport = 8883\n").await.unwrap();
        SyncConfig::ensure_default(&path).await.unwrap();
        let kept = SyncConfig::load_or_default(&path).await.unwrap();
        assert_eq!(kept.broker.port, 8883);
    }
}
