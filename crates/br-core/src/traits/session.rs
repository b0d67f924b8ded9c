//! Remote session traits
//!
//! A remote session is one authenticated connection running one command,
//! with its standard streams exposed as async byte streams.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::EndpointConfig;
use crate::error::RunError;

/// Remote command standard output
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Remote command standard input.
///
/// Shutting the stream down signals end-of-input to the remote command.
/// Dropping it without shutdown aborts the command's input instead.
pub type InputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Destination for a remote stream nobody reads directly
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// One remote command execution
///
/// Streams and sinks are wired before [`RemoteSession::start`]. Output that
/// is neither piped nor sunk is discarded.
#[async_trait]
pub trait RemoteSession: Send {
    /// Host this session is connected to
    fn host(&self) -> &str;

    /// Take the command's standard output as a stream. Callable once.
    fn output_stream(&mut self) -> Result<OutputStream, RunError>;

    /// Take the command's standard input as a stream. Callable once.
    fn input_stream(&mut self) -> Result<InputStream, RunError>;

    /// Send standard output to `sink` when it is not taken as a stream
    fn set_output_sink(&mut self, sink: ByteSink);

    /// Send standard error to `sink`
    fn set_error_sink(&mut self, sink: ByteSink);

    /// Spawn `command` on the remote host
    async fn start(&mut self, command: &str) -> Result<(), RunError>;

    /// Wait for the remote command to exit.
    ///
    /// Fails with [`RunError::RemoteExit`] on a non-zero status. Cancel-safe:
    /// dropping the future leaves the session waitable.
    async fn wait(&mut self) -> Result<(), RunError>;

    /// Release the connection and any remote process. Idempotent.
    async fn close(&mut self);
}

/// Opens remote sessions with the process-wide credentials
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connect and authenticate to `endpoint`
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Box<dyn RemoteSession>, RunError>;
}
