//! Job status types shared with the status surface

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Whether a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Idle,
    Running,
}

/// Outcome of the most recent finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    /// Failure description, empty when the run succeeded
    pub error: String,
    /// When that run started
    pub started_at: Option<Timestamp>,
}

/// Point-in-time view of the job, as served to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub working: bool,
    pub started_at: Option<Timestamp>,
    pub last_run: LastRun,
}
