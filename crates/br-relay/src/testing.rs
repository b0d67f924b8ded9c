//! Test support for code built on the relay
//!
//! Enabled for this crate's own tests and, through the `test-util`
//! feature, for dependents' tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reader that yields the given chunks one per read, then end-of-stream.
///
/// A failing reader reports a connection reset instead of end-of-stream.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    fail_at_end: bool,
}

impl ChunkedReader {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            fail_at_end: false,
        }
    }

    pub fn failing(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            fail_at_end: true,
        }
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.chunks.push_front(chunk.split_off(n));
                }
                Poll::Ready(Ok(()))
            }
            None if self.fail_at_end => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            None => Poll::Ready(Ok(())),
        }
    }
}
