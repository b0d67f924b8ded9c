//! Relay error types

use thiserror::Error;

/// Errors that abort a relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Reading from the upstream stream failed
    #[error("failed reading source output: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the downstream stream failed
    #[error("failed writing destination input: {0}")]
    Write(#[source] std::io::Error),

    /// The relay was cancelled before both directions finished
    #[error("relay cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether this error came from cancellation rather than I/O
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }
}
