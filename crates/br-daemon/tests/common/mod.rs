//! In-memory remote sessions for driving the orchestrator in tests

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

use br_core::config::{AppConfig, EndpointConfig, HttpConfig, RelayConfig};
use br_core::traits::{ByteSink, InputStream, OutputStream, RemoteSession, SessionFactory};
use br_core::RunError;
use br_daemon::JobOrchestrator;
use br_relay::testing::ChunkedReader;

pub const SOURCE_HOST: &str = "db-old";
pub const DESTINATION_HOST: &str = "db-new";

/// Failure to inject into one side of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// `open` fails
    Open,
    /// `start` fails
    Start,
    /// `start` panics
    Panic,
    /// Output stream errors after yielding the data
    ReadError,
    /// Output never ends and the command never exits
    Hang,
    /// Command exits with the given status
    Exit(u32),
}

/// What the mock sessions observed
#[derive(Default)]
pub struct Recorder {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
    /// Every write to the destination's input, in order
    pub delivered: Mutex<Vec<Vec<u8>>>,
    pub input_closed: AtomicBool,
    pub started: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn delivered_bytes(&self) -> Vec<u8> {
        self.delivered.lock().unwrap().concat()
    }

    pub fn delivered_sizes(&self) -> Vec<usize> {
        self.delivered.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Session factory handing out [`MockSession`]s
pub struct MockFactory {
    pub source_output: Vec<Vec<u8>>,
    pub source_fault: Fault,
    pub destination_fault: Fault,
    /// When set, the source command does not exit until notified
    pub gate: Option<Arc<Notify>>,
    pub recorder: Arc<Recorder>,
}

impl MockFactory {
    pub fn new(source_output: &[u8]) -> Self {
        Self {
            source_output: vec![source_output.to_vec()],
            source_fault: Fault::None,
            destination_fault: Fault::None,
            gate: None,
            recorder: Arc::new(Recorder::default()),
        }
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Box<dyn RemoteSession>, RunError> {
        let is_source = endpoint.host == SOURCE_HOST;
        let fault = if is_source {
            self.source_fault
        } else {
            self.destination_fault
        };

        if fault == Fault::Open {
            return Err(RunError::Connect {
                host: endpoint.host.clone(),
                reason: "connection refused".to_string(),
            });
        }

        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            host: endpoint.host.clone(),
            fault,
            output: if is_source {
                self.source_output.clone()
            } else {
                Vec::new()
            },
            gate: if is_source { self.gate.clone() } else { None },
            recorder: Arc::clone(&self.recorder),
            held_open: None,
            released: false,
        }))
    }
}

pub struct MockSession {
    host: String,
    fault: Fault,
    output: Vec<Vec<u8>>,
    gate: Option<Arc<Notify>>,
    recorder: Arc<Recorder>,
    /// Write half keeping a hanging output stream open
    held_open: Option<tokio::io::DuplexStream>,
    released: bool,
}

impl MockSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.recorder.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn output_stream(&mut self) -> Result<OutputStream, RunError> {
        if self.fault == Fault::Hang {
            let (reader, writer) = tokio::io::duplex(64);
            self.held_open = Some(writer);
            return Ok(Box::new(reader));
        }
        let chunks = std::mem::take(&mut self.output);
        if self.fault == Fault::ReadError {
            Ok(Box::new(ChunkedReader::failing(chunks)))
        } else {
            Ok(Box::new(ChunkedReader::new(chunks)))
        }
    }

    fn input_stream(&mut self) -> Result<InputStream, RunError> {
        Ok(Box::new(RecordingInput {
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn set_output_sink(&mut self, _sink: ByteSink) {}

    fn set_error_sink(&mut self, _sink: ByteSink) {}

    async fn start(&mut self, command: &str) -> Result<(), RunError> {
        self.recorder
            .started
            .lock()
            .unwrap()
            .push(self.host.clone());

        match self.fault {
            Fault::Start => Err(RunError::Spawn {
                host: self.host.clone(),
                reason: format!("cannot execute `{}`", command),
            }),
            Fault::Panic => panic!("injected fault on {}", self.host),
            _ => Ok(()),
        }
    }

    async fn wait(&mut self) -> Result<(), RunError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.fault {
            Fault::Hang => std::future::pending().await,
            Fault::Exit(code) => Err(RunError::RemoteExit {
                host: self.host.clone(),
                detail: format!("exit status {}", code),
            }),
            _ => Ok(()),
        }
    }

    async fn close(&mut self) {
        self.held_open = None;
        self.release();
    }
}

/// Destination input: records every write
struct RecordingInput {
    recorder: Arc<Recorder>,
}

impl AsyncWrite for RecordingInput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.recorder.delivered.lock().unwrap().push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.recorder.input_closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Configuration pointing at the mock hosts
pub fn test_config(threshold: usize) -> AppConfig {
    AppConfig {
        private_key_file: PathBuf::from("/dev/null"),
        source: EndpointConfig::new("dump", SOURCE_HOST, "pg_dump -Fc app"),
        destination: EndpointConfig::new("restore", DESTINATION_HOST, "pg_restore -d app"),
        connect_timeout: Duration::from_secs(5),
        run_timeout: None,
        relay: RelayConfig {
            threshold_bytes: threshold,
            read_chunk_bytes: 1024,
        },
        http: HttpConfig::default(),
    }
}

/// Orchestrator over `factory`, returning the recorder as well
pub fn orchestrator(factory: MockFactory, config: AppConfig) -> (JobOrchestrator, Arc<Recorder>) {
    let recorder = Arc::clone(&factory.recorder);
    (JobOrchestrator::new(Arc::new(factory), config), recorder)
}
