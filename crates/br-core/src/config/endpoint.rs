//! Remote endpoint configuration

use serde::{Deserialize, Serialize};

/// One side of the pipeline: who to log in as, where, and what to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Login user
    #[serde(alias = "User")]
    pub user: String,

    /// Host name or address, without port
    #[serde(alias = "Host")]
    pub host: String,

    /// SSH port
    #[serde(default = "default_port", alias = "Port")]
    pub port: u16,

    /// Command line executed by the remote shell
    #[serde(alias = "Command")]
    pub command: String,

    /// Expected host key fingerprint; any key is accepted when unset
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl EndpointConfig {
    /// Create an endpoint on the default SSH port
    pub fn new(user: impl Into<String>, host: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: default_port(),
            command: command.into(),
            host_key_fingerprint: None,
        }
    }

    /// Dial target as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `user@host` label for logs
    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
