//! Core error types for big-red

use std::path::PathBuf;
use std::time::Duration;

use br_relay::RelayError;
use thiserror::Error;

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Private key could not be loaded
    #[error("Failed to load private key {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },
}

/// Failures that abort a single run.
///
/// These never escape the run supervisor; they are rendered into the
/// `lastRun.error` field of the job state.
#[derive(Error, Debug)]
pub enum RunError {
    /// Could not reach the host or complete the SSH handshake
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// The host rejected our key
    #[error("Authentication rejected for {user}@{host}")]
    Auth { user: String, host: String },

    /// The remote command could not be spawned or its pipes set up
    #[error("Failed to start command on {host}: {reason}")]
    Spawn { host: String, reason: String },

    /// I/O failure while relaying
    #[error("Transfer failed: {0}")]
    Transfer(#[from] RelayError),

    /// A remote command exited unsuccessfully
    #[error("Command on {host} failed: {detail}")]
    RemoteExit { host: String, detail: String },

    /// An operator aborted the run
    #[error("Run cancelled")]
    Cancelled,

    /// The run exceeded its configured deadline
    #[error("Run timed out after {0:?}")]
    TimedOut(Duration),

    /// Any other fault, including a panic in the run body
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl RunError {
    /// Short stable tag for log records
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Connect { .. } => "connect",
            RunError::Auth { .. } => "auth",
            RunError::Spawn { .. } => "spawn",
            RunError::Transfer(_) => "transfer",
            RunError::RemoteExit { .. } => "remote_exit",
            RunError::Cancelled => "cancelled",
            RunError::TimedOut(_) => "timed_out",
            RunError::Internal(_) => "internal",
        }
    }

    /// Whether this failure is a consequence of cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            RunError::Cancelled => true,
            RunError::Transfer(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
