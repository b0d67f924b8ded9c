//! br-relay: Bounded streaming relay for big-red
//!
//! Moves bytes from one async byte stream to another through a shared,
//! bounded in-memory buffer. A producer task fills the buffer from the
//! upstream reader while a consumer task drains it into the downstream
//! writer in threshold-sized slices.

pub mod error;
pub mod relay;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::RelayError;
pub use relay::{RelayStats, StreamRelay, DEFAULT_READ_CHUNK, DEFAULT_THRESHOLD};
