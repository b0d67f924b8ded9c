//! br-daemon: Trigger-and-supervise daemon for big-red
//!
//! The daemon runs one fixed pipeline on demand: a command on the source
//! host is started over SSH, its standard output is relayed into the
//! standard input of a command on the destination host, and the outcome
//! of the most recent run is kept for the HTTP status page.

pub mod job;
pub mod server;
pub mod ssh;

pub use job::JobOrchestrator;
