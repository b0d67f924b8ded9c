//! Threshold-driven relay between an upstream reader and a downstream writer
//!
//! The relay owns a single [`BytesMut`] shared by exactly two tasks:
//!
//! - the producer reads chunks from upstream and appends them to the buffer
//! - the consumer waits until a full threshold is buffered (or upstream has
//!   ended), then splits one slice off the front and writes it downstream
//!
//! Both sides block on [`Notify`] rather than polling. The producer also
//! stops reading while a full threshold is still undelivered, so the bytes
//! held by the relay never exceed one threshold plus one upstream read.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// Default backpressure threshold (2 MiB).
///
/// The consumer wakes once this many bytes are buffered, and never hands
/// more than this many bytes to the downstream writer in one call.
pub const DEFAULT_THRESHOLD: usize = 2 * 1024 * 1024;

/// Default size of a single upstream read.
pub const DEFAULT_READ_CHUNK: usize = 32 * 1024;

/// Byte counters for a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes read from upstream
    pub bytes_read: u64,
    /// Bytes written downstream
    pub bytes_written: u64,
    /// Highest count of bytes read but not yet delivered downstream
    pub peak_buffered: usize,
}

/// State guarded by the relay mutex
struct Shared {
    /// Bytes read but not yet taken by the consumer
    buffer: BytesMut,
    /// Bytes read but not yet fully written, including the slice in flight
    undelivered: usize,
    peak_undelivered: usize,
    /// Cleared exactly once, when upstream reports end-of-stream
    upstream_open: bool,
}

/// What the consumer should do next
enum Slice {
    Ready(Bytes),
    Drained,
    Wait,
}

/// Single-use relay between one producer and one consumer
pub struct StreamRelay {
    threshold: usize,
    read_chunk: usize,
    shared: Mutex<Shared>,
    /// Signalled when the consumer's wake condition may have become true
    data_ready: Notify,
    /// Signalled when the consumer has delivered a slice
    space_ready: Notify,
    cancel: CancellationToken,
}

impl StreamRelay {
    /// Create a relay with the given threshold and the default read size
    pub fn new(threshold: usize) -> Self {
        Self::with_read_chunk(threshold, DEFAULT_READ_CHUNK)
    }

    /// Create a relay with a custom upstream read size
    pub fn with_read_chunk(threshold: usize, read_chunk: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            read_chunk: read_chunk.max(1),
            shared: Mutex::new(Shared {
                buffer: BytesMut::new(),
                undelivered: 0,
                peak_undelivered: 0,
                upstream_open: true,
            }),
            data_ready: Notify::new(),
            space_ready: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort both directions when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Backpressure threshold in bytes
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Relay every byte from `upstream` into `downstream`.
    ///
    /// Producer and consumer run concurrently on the calling task. The first
    /// failure in either direction drops the other direction and is returned.
    /// On success the downstream writer has been shut down exactly once; on
    /// failure it is dropped without shutdown.
    pub async fn run<R, W>(self, upstream: R, downstream: W) -> Result<RelayStats, RelayError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let (bytes_read, bytes_written) =
            tokio::try_join!(self.produce(upstream), self.consume(downstream))?;

        let peak_buffered = self.lock().peak_undelivered;
        Ok(RelayStats {
            bytes_read,
            bytes_written,
            peak_buffered,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn produce<R: AsyncRead + Unpin>(&self, mut upstream: R) -> Result<u64, RelayError> {
        tracing::debug!("Starting read");

        let mut chunk = vec![0u8; self.read_chunk];
        let mut total: u64 = 0;

        loop {
            self.wait_for_space().await?;

            let n = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RelayError::Cancelled),
                read = upstream.read(&mut chunk) => read.map_err(RelayError::Read)?,
            };
            if n == 0 {
                break;
            }
            total += n as u64;

            let wake = {
                let mut shared = self.lock();
                shared.buffer.extend_from_slice(&chunk[..n]);
                shared.undelivered += n;
                shared.peak_undelivered = shared.peak_undelivered.max(shared.undelivered);
                shared.buffer.len() >= self.threshold
            };
            if wake {
                self.data_ready.notify_one();
            }
        }

        self.lock().upstream_open = false;
        self.data_ready.notify_one();

        tracing::info!("Finished reading source. Total size: {} bytes", total);
        Ok(total)
    }

    async fn wait_for_space(&self) -> Result<(), RelayError> {
        loop {
            let has_space = self.lock().undelivered < self.threshold;
            if has_space {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = self.space_ready.notified() => {}
            }
        }
    }

    async fn consume<W: AsyncWrite + Unpin>(&self, mut downstream: W) -> Result<u64, RelayError> {
        tracing::debug!("Starting write");

        let mut total: u64 = 0;

        while let Some(slice) = self.next_slice().await? {
            let len = slice.len();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RelayError::Cancelled),
                written = downstream.write_all(&slice) => written.map_err(RelayError::Write)?,
            }
            total += len as u64;

            self.lock().undelivered -= len;
            self.space_ready.notify_one();

            tracing::debug!("Wrote {} bytes ({} total)", len, total);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RelayError::Cancelled),
            closed = async {
                downstream.flush().await?;
                downstream.shutdown().await
            } => closed.map_err(RelayError::Write)?,
        }

        tracing::info!("Finished writing destination. Total size: {} bytes", total);
        Ok(total)
    }

    /// Wait for the next slice to deliver, or `None` once upstream is drained
    async fn next_slice(&self) -> Result<Option<Bytes>, RelayError> {
        loop {
            let next = {
                let mut shared = self.lock();
                let buffered = shared.buffer.len();
                if buffered >= self.threshold || (!shared.upstream_open && buffered > 0) {
                    let take = buffered.min(self.threshold);
                    Slice::Ready(shared.buffer.split_to(take).freeze())
                } else if !shared.upstream_open {
                    Slice::Drained
                } else {
                    Slice::Wait
                }
            };

            match next {
                Slice::Ready(bytes) => return Ok(Some(bytes)),
                Slice::Drained => return Ok(None),
                Slice::Wait => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(RelayError::Cancelled),
                        _ = self.data_ready.notified() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::testing::ChunkedReader;

    /// Writer recording each write call, yielding once between writes
    #[derive(Default)]
    struct RecordingWriter {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        shut_down: Arc<AtomicBool>,
        yield_next: bool,
        fail: bool,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "destination closed",
                )));
            }
            if self.yield_next {
                self.yield_next = false;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            self.yield_next = true;
            self.writes.lock().unwrap().push(buf.to_vec());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shut_down.store(true, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_small_threshold_delivers_fixed_slices() {
        let writer = RecordingWriter::default();
        let writes = Arc::clone(&writer.writes);
        let shut_down = Arc::clone(&writer.shut_down);

        let relay = StreamRelay::new(4);
        let stats = relay
            .run(ChunkedReader::new(vec![b"abcdefghij".to_vec()]), writer)
            .await
            .unwrap();

        let writes = writes.lock().unwrap();
        let sizes: Vec<usize> = writes.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(writes.concat(), b"abcdefghij");
        assert_eq!(stats.bytes_read, 10);
        assert_eq!(stats.bytes_written, 10);
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_preserves_bytes_across_sizes() {
        let threshold = 64;
        for len in [0, 1, threshold, threshold * 5 + 17] {
            let input = pattern(len);
            let chunks: Vec<Vec<u8>> = input.chunks(23).map(<[u8]>::to_vec).collect();

            let writer = RecordingWriter::default();
            let writes = Arc::clone(&writer.writes);

            let stats = StreamRelay::with_read_chunk(threshold, 23)
                .run(ChunkedReader::new(chunks), writer)
                .await
                .unwrap();

            let writes = writes.lock().unwrap();
            assert_eq!(writes.concat(), input, "length {}", len);
            assert!(writes.iter().all(|w| w.len() <= threshold));
            assert_eq!(stats.bytes_written, len as u64);
        }
    }

    #[tokio::test]
    async fn test_empty_upstream_still_closes_downstream() {
        let writer = RecordingWriter::default();
        let writes = Arc::clone(&writer.writes);
        let shut_down = Arc::clone(&writer.shut_down);

        let stats = StreamRelay::new(DEFAULT_THRESHOLD)
            .run(ChunkedReader::new(vec![]), writer)
            .await
            .unwrap();

        assert!(writes.lock().unwrap().is_empty());
        assert!(shut_down.load(Ordering::SeqCst));
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_buffered_bytes_stay_bounded() {
        let threshold = 64;
        let read_chunk = 16;
        let chunks = vec![vec![7u8; read_chunk]; 200];

        let stats = StreamRelay::with_read_chunk(threshold, read_chunk)
            .run(ChunkedReader::new(chunks), RecordingWriter::default())
            .await
            .unwrap();

        assert_eq!(stats.bytes_written, 200 * read_chunk as u64);
        assert!(stats.peak_buffered <= threshold + read_chunk);
        assert!(stats.peak_buffered >= threshold);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_without_closing_downstream() {
        let writer = RecordingWriter::default();
        let shut_down = Arc::clone(&writer.shut_down);

        let result = timeout(
            Duration::from_secs(5),
            StreamRelay::new(4).run(ChunkedReader::failing(vec![b"abc".to_vec()]), writer),
        )
        .await
        .expect("relay should not hang");

        assert!(matches!(result, Err(RelayError::Read(_))));
        assert!(!shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_write_failure_aborts_reader() {
        let writer = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        // Producer would block on backpressure forever if the failure were lost
        let chunks = vec![vec![1u8; 8]; 64];

        let result = timeout(
            Duration::from_secs(5),
            StreamRelay::with_read_chunk(8, 8).run(ChunkedReader::new(chunks), writer),
        )
        .await
        .expect("relay should not hang");

        assert!(matches!(result, Err(RelayError::Write(_))));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_idle_relay() {
        // Keep the write half alive so upstream never reaches end-of-stream
        let (upstream, _held_open) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let relay = StreamRelay::new(4).with_cancel(cancel.clone());

        let task = tokio::spawn(relay.run(upstream, RecordingWriter::default()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = timeout(Duration::from_secs(5), task)
            .await
            .expect("relay should observe cancellation")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }
}
