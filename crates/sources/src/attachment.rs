use std::sync::Arc;

use bytes::Bytes;
use mediarelay_protocol::RemoteFuture;
use mediarelay_transfer::{ChunkStream, RetryPolicy, Source, SourceError, with_retry};
use tracing::debug;

/// Size of each offset request (512 KiB).
pub const ATTACHMENT_REQUEST_SIZE: usize = 512 * 1024;

/// Fetches a byte range of a remote attachment.
///
/// An empty result means the offset is past the end of the attachment.
pub trait RangeFetcher: Send + Sync {
    fn fetch(&self, offset: u64, limit: usize) -> RemoteFuture<'_, Bytes>;
}

/// Chat-message attachment read by successive offset requests.
///
/// Stops once the declared size is reached or the remote returns an empty
/// range. Every request goes through [`with_retry`].
pub struct AttachmentSource {
    fetcher: Arc<dyn RangeFetcher>,
    name: String,
    declared_size: u64,
    request_size: usize,
    retry: RetryPolicy,
}

impl AttachmentSource {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, name: impl Into<String>, declared_size: u64) -> Self {
        Self {
            fetcher,
            name: name.into(),
            declared_size,
            request_size: ATTACHMENT_REQUEST_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_size(mut self, request_size: usize) -> Self {
        self.request_size = request_size.max(1);
        self
    }
}

impl Source for AttachmentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> u64 {
        self.declared_size
    }

    fn produce(self: Box<Self>) -> ChunkStream {
        let this = Arc::new(*self);
        Box::pin(futures_util::stream::unfold(Some(0u64), move |offset| {
            let this = Arc::clone(&this);
            async move {
                let offset = offset?;
                if this.declared_size > 0 && offset >= this.declared_size {
                    return None;
                }
                let limit = this.request_size;
                let fetcher = this.fetcher.as_ref();
                let result = with_retry(&this.retry, "attachment fetch", || fetcher.fetch(offset, limit)).await;
                match result {
                    Ok(chunk) if chunk.is_empty() => {
                        debug!(name = %this.name, offset, "attachment exhausted");
                        None
                    }
                    Ok(chunk) => {
                        let next = offset + chunk.len() as u64;
                        Some((Ok(chunk), Some(next)))
                    }
                    Err(e) => Some((Err(SourceError::Remote(e)), None)),
                }
            }
        }))
    }
}
