//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};
use super::EndpointConfig;
use crate::error::ConfigError;

/// Top-level configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Private key used to authenticate to both endpoints
    #[serde(alias = "PrivateKeyFile")]
    pub private_key_file: PathBuf,

    /// Host running the producing command
    #[serde(alias = "Source")]
    pub source: EndpointConfig,

    /// Host running the consuming command
    #[serde(alias = "Destination")]
    pub destination: EndpointConfig,

    /// Timeout for establishing each SSH connection
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Deadline for a whole run; unbounded when unset
    #[serde(default, with = "option_duration_secs")]
    pub run_timeout: Option<Duration>,

    /// Relay tuning
    #[serde(default)]
    pub relay: RelayConfig,

    /// Status surface
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

impl AppConfig {
    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("private_key_file".into()));
        }

        for (side, endpoint) in [("source", &self.source), ("destination", &self.destination)] {
            if endpoint.user.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.user", side)));
            }
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.host", side)));
            }
            if endpoint.command.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.command", side)));
            }
        }

        if self.relay.threshold_bytes == 0 {
            return Err(ConfigError::Invalid("relay.threshold_bytes must be positive".into()));
        }
        if self.relay.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("relay.read_chunk_bytes must be positive".into()));
        }

        Ok(())
    }
}

/// Relay buffer sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Backpressure threshold and maximum single write to the destination
    pub threshold_bytes: usize,

    /// Size of each read from the source
    pub read_chunk_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: br_relay::DEFAULT_THRESHOLD,
            read_chunk_bytes: br_relay::DEFAULT_READ_CHUNK,
        }
    }
}

/// HTTP status surface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the status page listens on
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}
