//! Remote standard input as an [`AsyncWrite`]
//!
//! Writes are queued to the session's pump task, which owns the SSH channel.
//! An explicit shutdown queues end-of-input; dropping the pipe without a
//! shutdown closes the receiver instead, which the pump treats as an abort.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Queue depth between the pipe and the pump
pub(crate) const INPUT_QUEUE_DEPTH: usize = 4;

/// Message from the input pipe to the pump
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InputChunk {
    Data(Bytes),
    Eof,
}

/// Writer half of a remote command's standard input
pub struct InputPipe {
    tx: PollSender<InputChunk>,
    shut_down: bool,
}

impl InputPipe {
    pub(crate) fn new(tx: mpsc::Sender<InputChunk>) -> Self {
        Self {
            tx: PollSender::new(tx),
            shut_down: false,
        }
    }

    pub(crate) fn channel() -> (Self, mpsc::Receiver<InputChunk>) {
        let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
        (Self::new(tx), rx)
    }
}

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "remote input closed")
}

impl AsyncWrite for InputPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.shut_down {
            return Poll::Ready(Err(closed_pipe()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.tx.poll_reserve(cx)).map_err(|_| closed_pipe())?;
        this.tx
            .send_item(InputChunk::Data(Bytes::copy_from_slice(buf)))
            .map_err(|_| closed_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.shut_down {
            return Poll::Ready(Ok(()));
        }

        ready!(this.tx.poll_reserve(cx)).map_err(|_| closed_pipe())?;
        this.tx.send_item(InputChunk::Eof).map_err(|_| closed_pipe())?;
        this.tx.close();
        this.shut_down = true;
        Poll::Ready(Ok(()))
    }
}
