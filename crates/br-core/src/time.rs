//! Wall-clock timestamps
//!
//! Job start times are reported to the status surface as Unix milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A point in time, in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current time.
    ///
    /// A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Construct from raw Unix milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Raw Unix milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}
