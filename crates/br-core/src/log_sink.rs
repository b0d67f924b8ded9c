//! Byte sink that forwards writes to the log
//!
//! Remote commands' diagnostic streams are captured by wiring them to a
//! [`LogSink`]. Every write becomes one log record; nothing is line-buffered.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// [`AsyncWrite`] adapter emitting one `info` record per write
#[derive(Debug, Clone)]
pub struct LogSink {
    stream: Arc<str>,
    records: u64,
}

impl LogSink {
    /// Create a sink tagging its records with `stream`
    pub fn new(stream: impl Into<Arc<str>>) -> Self {
        Self {
            stream: stream.into(),
            records: 0,
        }
    }
}

impl AsyncWrite for LogSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !buf.is_empty() {
            let text = String::from_utf8_lossy(buf);
            tracing::info!(stream = %self.stream, "{}", text.trim_end_matches('\n'));
            self.records += 1;
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        tracing::debug!(stream = %self.stream, records = self.records, "Stream closed");
        Poll::Ready(Ok(()))
    }
}
