use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use mediarelay_protocol::RemoteError;

/// Ordered sequence of byte chunks produced by a [`Source`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// Errors raised while producing source bytes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("source size unknown")]
    UnknownSize,

    #[error("{0}")]
    Other(String),
}

/// One origin of relayed bytes.
///
/// Chunks are produced in increasing, non-overlapping offset order. The
/// stream ending (or yielding an empty chunk) marks end of data.
pub trait Source: Send {
    fn name(&self) -> &str;

    fn declared_size(&self) -> u64;

    /// Consumes the source and returns its chunk stream.
    fn produce(self: Box<Self>) -> ChunkStream;
}

/// Future returned by [`SourceProvider::open`].
pub type OpenFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn Source>, SourceError>> + Send + 'a>>;

/// Opens fresh [`Source`]s for one file.
///
/// A source is consumed by a single transfer attempt; a retry asks the
/// provider again, which may refresh expired links or reopen handles.
pub trait SourceProvider: Send + Sync {
    /// Display name, available before the source is opened.
    fn name(&self) -> &str;

    /// Size known ahead of opening, if any.
    fn declared_size(&self) -> Option<u64>;

    fn open(&self) -> OpenFuture<'_>;
}

/// In-memory source, split into chunks of a fixed size.
pub struct MemorySource {
    name: String,
    data: Bytes,
    chunk_size: usize,
    declared_size: u64,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            declared_size: data.len() as u64,
            data,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Overrides the declared size, e.g. to simulate a truncated origin.
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> u64 {
        self.declared_size
    }

    fn produce(self: Box<Self>) -> ChunkStream {
        let Self {
            data, chunk_size, ..
        } = *self;
        let chunks: Vec<Result<Bytes, SourceError>> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
            .collect();
        Box::pin(futures_util::stream::iter(chunks))
    }
}

/// Provider handing out [`MemorySource`]s over shared bytes.
#[derive(Clone)]
pub struct MemoryProvider {
    name: String,
    data: Bytes,
    chunk_size: usize,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            chunk_size,
        }
    }
}

impl SourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn open(&self) -> OpenFuture<'_> {
        let source = MemorySource::new(self.name.clone(), self.data.clone(), self.chunk_size);
        Box::pin(async move { Ok(Box::new(source) as Box<dyn Source>) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn memory_source_splits_in_order() {
        let src = Box::new(MemorySource::new("a.bin", b"0123456789".to_vec(), 4));
        assert_eq!(src.declared_size(), 10);
        let chunks: Vec<Bytes> = src.produce().map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from("0123"), Bytes::from("4567"), Bytes::from("89")]);
    }

    #[tokio::test]
    async fn provider_opens_fresh_sources() {
        let provider = MemoryProvider::new("p.bin", b"abcdef".to_vec(), 4);
        assert_eq!(provider.declared_size(), Some(6));
        for _ in 0..2 {
            let src = provider.open().await.unwrap();
            assert_eq!(src.name(), "p.bin");
            assert_eq!(src.produce().count().await, 2);
        }
    }

    #[tokio::test]
    async fn memory_source_empty() {
        let src = Box::new(MemorySource::new("empty", Bytes::new(), 4));
        assert_eq!(src.produce().count().await, 0);
    }
}
