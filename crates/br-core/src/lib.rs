//! br-core: Core abstractions and configuration for big-red
//!
//! This crate provides the configuration structures, error taxonomy,
//! remote session traits and shared types used by the daemon.

pub mod config;
pub mod error;
pub mod log_sink;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ConfigError, RunError};
pub use log_sink::LogSink;
pub use time::Timestamp;
pub use types::{JobPhase, JobSnapshot, LastRun};
