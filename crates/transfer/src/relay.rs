use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::source::Source;

/// Callback fed with byte counts as data moves through a stage.
pub type ByteCallback = Arc<dyn Fn(u64) + Send + Sync>;

enum RelayItem {
    Chunk(Bytes),
    End,
    Failed,
}

/// Bounded single-producer, single-consumer byte relay.
///
/// The source runs in its own task and pushes chunks into a channel of
/// `capacity` slots, so at most `capacity` chunks are resident at once.
pub struct StreamRelay {
    source: Option<Box<dyn Source>>,
    name: String,
    declared_size: u64,
    capacity: usize,
    rx: Option<mpsc::Receiver<RelayItem>>,
    producer: Option<JoinHandle<()>>,
    consumed: u64,
    finished: bool,
    error: Arc<Mutex<Option<String>>>,
    on_download: Option<ByteCallback>,
}

impl StreamRelay {
    pub fn new(source: Box<dyn Source>, capacity: usize) -> Self {
        Self {
            name: source.name().to_string(),
            declared_size: source.declared_size(),
            source: Some(source),
            capacity: capacity.max(1),
            rx: None,
            producer: None,
            consumed: 0,
            finished: false,
            error: Arc::new(Mutex::new(None)),
            on_download: None,
        }
    }

    /// Registers a callback invoked with each chunk's length as it is enqueued.
    pub fn with_download_observer(mut self, observer: ByteCallback) -> Self {
        self.on_download = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Launches the producer task. Calling it again is a no-op.
    pub fn start(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        self.rx = Some(rx);

        let error = Arc::clone(&self.error);
        let observer = self.on_download.clone();
        let name = self.name.clone();

        self.producer = Some(tokio::spawn(async move {
            let mut stream = source.produce();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) if chunk.is_empty() => break,
                    Ok(chunk) => {
                        if let Some(cb) = &observer {
                            cb(chunk.len() as u64);
                        }
                        if tx.send(RelayItem::Chunk(chunk)).await.is_err() {
                            // Consumer gone.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(name = %name, error = %e, "relay producer failed");
                        *error.lock() = Some(e.to_string());
                        let _ = tx.send(RelayItem::Failed).await;
                        return;
                    }
                }
            }
            debug!(name = %name, "relay producer finished");
            let _ = tx.send(RelayItem::End).await;
        }));
    }

    /// Returns the next chunk, or an empty `Bytes` once the stream is over.
    ///
    /// The empty terminal value is returned on every call after the end,
    /// including after a producer failure; see [`producer_error`](Self::producer_error).
    pub async fn read(&mut self) -> Bytes {
        if self.finished {
            return Bytes::new();
        }
        self.start();

        let Some(rx) = self.rx.as_mut() else {
            self.finished = true;
            return Bytes::new();
        };

        match rx.recv().await {
            Some(RelayItem::Chunk(chunk)) => {
                self.consumed += chunk.len() as u64;
                chunk
            }
            Some(RelayItem::End) | Some(RelayItem::Failed) => {
                self.finished = true;
                Bytes::new()
            }
            None => {
                // Producer task ended without a terminal item (panic or abort).
                let mut error = self.error.lock();
                if error.is_none() {
                    *error = Some("producer task ended unexpectedly".into());
                }
                self.finished = true;
                Bytes::new()
            }
        }
    }

    /// Cumulative bytes handed to the consumer.
    pub fn tell(&self) -> u64 {
        self.consumed
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.rx.as_ref().map_or(0, |rx| rx.len())
    }

    /// Failure text of the producer, if it failed.
    pub fn producer_error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}
