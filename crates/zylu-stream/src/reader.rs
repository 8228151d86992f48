//! Reader side of a broker stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

/// One attached consumer of a broker stream.
///
/// Yields the buffered chunks from position zero, then live chunks in write
/// order, then terminates once the stream is closed and drained.  Each
/// reader owns an independent queue, so a slow reader delays nobody.
pub struct StreamReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl StreamReader {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Receive the next chunk, or `None` at end-of-stream.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for StreamReader {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader").finish()
    }
}
