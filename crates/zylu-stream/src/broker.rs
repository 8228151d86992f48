//! Stream registry and per-stream chunk buffers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::reader::StreamReader;

/// Errors produced by the broker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// A stream with this id is already open or still retained after close.
    #[error("duplicate stream: {0}")]
    DuplicateStream(String),

    /// The stream was closed; no further chunks may be written.
    #[error("stream closed: {0}")]
    StreamClosed(String),
}

/// Broker tuning knobs.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a closed stream's buffer is kept around so that late
    /// attachments still succeed.
    pub retention: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(300),
        }
    }
}

/// Shared per-stream buffer.
///
/// `chunks` is the replay log; `readers` holds one unbounded sender per
/// attached reader so the writer never waits on a slow consumer.  Dropping a
/// sender terminates that reader's stream, which is how end-of-stream is
/// signalled after close.
struct BufferState {
    chunks: Vec<Bytes>,
    readers: Vec<mpsc::UnboundedSender<Bytes>>,
    closed: bool,
}

type SharedBuffer = Arc<Mutex<BufferState>>;
type StreamMap = Arc<Mutex<HashMap<String, SharedBuffer>>>;

/// Registry of in-flight and recently finished streams.
///
/// Cheap to clone; all clones share the same stream map.
#[derive(Clone)]
pub struct StreamBroker {
    streams: StreamMap,
    config: BrokerConfig,
}

impl StreamBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Create a new buffered stream and hand its single writer to the caller.
    ///
    /// Fails with [`BrokerError::DuplicateStream`] if the id names a stream
    /// that is open or closed-and-retained; ids are expected to be unique by
    /// construction, so a collision indicates a caller bug.
    pub fn open(&self, stream_id: &str) -> Result<StreamWriter, BrokerError> {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        if streams.contains_key(stream_id) {
            return Err(BrokerError::DuplicateStream(stream_id.to_owned()));
        }

        let buffer: SharedBuffer = Arc::new(Mutex::new(BufferState {
            chunks: Vec::new(),
            readers: Vec::new(),
            closed: false,
        }));
        streams.insert(stream_id.to_owned(), Arc::clone(&buffer));

        debug!(stream_id, "stream opened");
        Ok(StreamWriter {
            stream_id: stream_id.to_owned(),
            buffer,
            streams: Arc::clone(&self.streams),
            retention: self.config.retention,
            closed: false,
        })
    }

    /// Attach a reader that replays the buffer from position zero and then
    /// follows live output until the stream closes.
    ///
    /// Returns `None` when the id is unknown or the buffer has been evicted.
    pub fn attach(&self, stream_id: &str) -> Option<StreamReader> {
        let buffer = {
            let streams = self.streams.lock().expect("stream map poisoned");
            Arc::clone(streams.get(stream_id)?)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = buffer.lock().expect("stream buffer poisoned");
        for chunk in &state.chunks {
            // The receiver half is still alive here, so this cannot fail.
            let _ = tx.send(chunk.clone());
        }
        if !state.closed {
            state.readers.push(tx);
        }
        // When already closed, `tx` drops here and the reader observes
        // end-of-stream right after draining the replayed chunks.
        Some(StreamReader::new(rx))
    }

    /// Whether a stream id is currently known (open or retained).
    pub fn contains(&self, stream_id: &str) -> bool {
        self.streams
            .lock()
            .expect("stream map poisoned")
            .contains_key(stream_id)
    }
}

/// Exclusive write handle for one stream.
///
/// Exactly one writer exists per stream id.  Dropping the writer without
/// calling [`StreamWriter::close`] closes the stream anyway so that readers
/// of a crashed producer drain and terminate instead of hanging.
pub struct StreamWriter {
    stream_id: String,
    buffer: SharedBuffer,
    streams: StreamMap,
    retention: Duration,
    closed: bool,
}

impl StreamWriter {
    /// Append a chunk and fan it out to every attached reader.
    ///
    /// Readers whose receiving half has gone away are pruned here.
    pub fn write(&self, chunk: Bytes) -> Result<(), BrokerError> {
        let mut state = self.buffer.lock().expect("stream buffer poisoned");
        if state.closed {
            return Err(BrokerError::StreamClosed(self.stream_id.clone()));
        }
        state.chunks.push(chunk.clone());
        state.readers.retain(|tx| tx.send(chunk.clone()).is_ok());
        Ok(())
    }

    /// Mark the stream terminal.  Idempotent.
    ///
    /// Attached readers observe end-of-stream once they drain their queues;
    /// the buffer stays attachable for the retention window, after which a
    /// background task evicts it.
    pub fn close(&mut self) {
        self.close_inner();
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn close_inner(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        {
            let mut state = self.buffer.lock().expect("stream buffer poisoned");
            state.closed = true;
            // Dropping the senders is the end-of-stream signal.
            state.readers.clear();
        }

        let streams = Arc::clone(&self.streams);
        let stream_id = self.stream_id.clone();
        let retention = self.retention;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(retention).await;
                    streams
                        .lock()
                        .expect("stream map poisoned")
                        .remove(&stream_id);
                    debug!(stream_id, "stream buffer evicted");
                });
            }
            Err(_) => {
                // No runtime to schedule eviction on (writer dropped during
                // shutdown); evict immediately rather than leak the buffer.
                warn!(stream_id = %self.stream_id, "no runtime at close; evicting stream buffer now");
                streams
                    .lock()
                    .expect("stream map poisoned")
                    .remove(&self.stream_id);
            }
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl std::fmt::Debug for StreamBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.streams.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("StreamBroker")
            .field("streams", &count)
            .field("retention", &self.config.retention)
            .finish()
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("stream_id", &self.stream_id)
            .field("closed", &self.closed)
            .finish()
    }
}
