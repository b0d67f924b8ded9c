//! A remote command running over one SSH session channel
//!
//! After `exec`, a pump task takes ownership of the channel. It forwards
//! channel data to the configured output and error targets, forwards the
//! input pipe into the channel, and resolves with how the command ended.

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use br_core::traits::{ByteSink, InputStream, OutputStream, RemoteSession};
use br_core::RunError;

use super::connector::ClientHandler;
use super::pipe::{InputChunk, InputPipe};

/// Capacity of the in-memory pipe carrying remote standard output
const OUTPUT_PIPE_CAPACITY: usize = 256 * 1024;

/// Extended data type code for stderr (RFC 4254 §5.2)
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// How the remote command ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandExit {
    Status(u32),
    Signal { name: String, message: String },
    /// The channel closed without reporting a status
    Vanished,
    /// The session broke or the server refused the request
    Failed(String),
}

impl CommandExit {
    fn into_result(self, host: &str) -> Result<(), RunError> {
        let detail = match self {
            CommandExit::Status(0) => return Ok(()),
            CommandExit::Status(code) => format!("exit status {}", code),
            CommandExit::Signal { name, message } if message.is_empty() => {
                format!("killed by signal {}", name)
            }
            CommandExit::Signal { name, message } => {
                format!("killed by signal {}: {}", name, message)
            }
            CommandExit::Vanished => "channel closed without exit status".to_string(),
            CommandExit::Failed(reason) => reason,
        };
        Err(RunError::RemoteExit {
            host: host.to_string(),
            detail,
        })
    }
}

/// Remote command over SSH
pub struct SshSession {
    host: String,
    handle: Option<Handle<ClientHandler>>,
    /// Present until the command is started
    channel: Option<Channel<Msg>>,
    stdout: Option<ByteSink>,
    stdout_piped: bool,
    stderr: Option<ByteSink>,
    stdin: Option<mpsc::Receiver<InputChunk>>,
    pump: Option<JoinHandle<CommandExit>>,
    exit: Option<CommandExit>,
}

impl SshSession {
    pub(crate) fn new(host: String, handle: Handle<ClientHandler>, channel: Channel<Msg>) -> Self {
        Self {
            host,
            handle: Some(handle),
            channel: Some(channel),
            stdout: None,
            stdout_piped: false,
            stderr: None,
            stdin: None,
            pump: None,
            exit: None,
        }
    }

    fn spawn_error(&self, reason: impl Into<String>) -> RunError {
        RunError::Spawn {
            host: self.host.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn output_stream(&mut self) -> Result<OutputStream, RunError> {
        if self.stdout_piped || self.channel.is_none() {
            return Err(self.spawn_error("stdout already taken"));
        }
        let (reader, writer) = tokio::io::duplex(OUTPUT_PIPE_CAPACITY);
        self.stdout = Some(Box::new(writer));
        self.stdout_piped = true;
        Ok(Box::new(reader))
    }

    fn input_stream(&mut self) -> Result<InputStream, RunError> {
        if self.stdin.is_some() || self.channel.is_none() {
            return Err(self.spawn_error("stdin already taken"));
        }
        let (pipe, rx) = InputPipe::channel();
        self.stdin = Some(rx);
        Ok(Box::new(pipe))
    }

    fn set_output_sink(&mut self, sink: ByteSink) {
        if self.stdout_piped {
            tracing::warn!("stdout of {} is piped, ignoring output sink", self.host);
            return;
        }
        self.stdout = Some(sink);
    }

    fn set_error_sink(&mut self, sink: ByteSink) {
        self.stderr = Some(sink);
    }

    async fn start(&mut self, command: &str) -> Result<(), RunError> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| self.spawn_error("command already started"))?;

        tracing::debug!("Executing on {}: {}", self.host, command);
        channel
            .exec(true, command)
            .await
            .map_err(|e| self.spawn_error(format!("exec failed: {}", e)))?;

        // Nothing will ever be written, so the command must not wait for input
        if self.stdin.is_none() {
            channel
                .eof()
                .await
                .map_err(|e| self.spawn_error(format!("failed to close stdin: {}", e)))?;
        }

        self.pump = Some(tokio::spawn(pump(
            self.host.clone(),
            channel,
            self.stdout.take(),
            self.stderr.take(),
            self.stdin.take(),
        )));
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), RunError> {
        if let Some(exit) = &self.exit {
            return exit.clone().into_result(&self.host);
        }

        let pump = self
            .pump
            .as_mut()
            .ok_or_else(|| RunError::Spawn {
                host: self.host.clone(),
                reason: "command not started".to_string(),
            })?;

        let exit = match pump.await {
            Ok(exit) => exit,
            Err(e) => CommandExit::Failed(format!("session task failed: {}", e)),
        };
        self.pump = None;
        self.exit = Some(exit.clone());
        exit.into_result(&self.host)
    }

    async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.channel = None;
        self.stdin = None;

        if let Some(handle) = self.handle.take() {
            tracing::debug!("Disconnecting from {}", self.host);
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "closing", "en")
                .await
            {
                tracing::debug!("Disconnect from {} failed: {}", self.host, e);
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Write `data` to `target`, dropping the target once it stops accepting
async fn forward(target: &mut Option<ByteSink>, data: &[u8], host: &str, stream: &str) {
    if let Some(sink) = target.as_mut() {
        if let Err(e) = sink.write_all(data).await {
            tracing::warn!("{} {} is no longer read ({}), discarding", host, stream, e);
            *target = None;
        }
    }
}

async fn next_input(stdin: &mut Option<mpsc::Receiver<InputChunk>>) -> Option<InputChunk> {
    match stdin {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn finish<W: AsyncWrite + Unpin + ?Sized>(sink: &mut W) {
    let _ = sink.shutdown().await;
}

async fn pump(
    host: String,
    mut channel: Channel<Msg>,
    mut stdout: Option<ByteSink>,
    mut stderr: Option<ByteSink>,
    mut stdin: Option<mpsc::Receiver<InputChunk>>,
) -> CommandExit {
    let mut exit = CommandExit::Vanished;

    loop {
        tokio::select! {
            msg = channel.wait() => {
                let Some(msg) = msg else { break };
                match msg {
                    ChannelMsg::Data { data } => {
                        forward(&mut stdout, &data, &host, "stdout").await;
                    }
                    ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                        forward(&mut stderr, &data, &host, "stderr").await;
                    }
                    ChannelMsg::Eof => {
                        if let Some(mut out) = stdout.take() {
                            finish(&mut out).await;
                        }
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        tracing::debug!("{} exited with status {}", host, exit_status);
                        exit = CommandExit::Status(exit_status);
                    }
                    ChannelMsg::ExitSignal { signal_name, error_message, .. } => {
                        exit = CommandExit::Signal {
                            name: format!("{:?}", signal_name),
                            message: error_message,
                        };
                    }
                    ChannelMsg::Failure => {
                        exit = CommandExit::Failed("server refused to execute command".to_string());
                        break;
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
            chunk = next_input(&mut stdin), if stdin.is_some() => {
                match chunk {
                    Some(InputChunk::Data(bytes)) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            exit = CommandExit::Failed(format!("failed sending input: {}", e));
                            break;
                        }
                    }
                    Some(InputChunk::Eof) => {
                        tracing::debug!("Closing input of {}", host);
                        if let Err(e) = channel.eof().await {
                            exit = CommandExit::Failed(format!("failed closing input: {}", e));
                            break;
                        }
                        stdin = None;
                    }
                    None => {
                        // Writer dropped without shutdown: abort rather than
                        // let the command see a clean end of input
                        tracing::warn!("Input to {} aborted, closing channel", host);
                        let _ = channel.close().await;
                        stdin = None;
                    }
                }
            }
        }
    }

    if let Some(mut out) = stdout.take() {
        finish(&mut out).await;
    }
    if let Some(mut err) = stderr.take() {
        finish(&mut err).await;
    }
    exit
}
