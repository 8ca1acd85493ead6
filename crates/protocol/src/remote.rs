//! Remote interfaces.
//!
//! The integrator implements these traits to bridge the relay to a concrete
//! chunked-upload and messaging backend. Methods return boxed futures so the
//! traits stay object safe and can be held as `Arc<dyn ...>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use crate::media::MediaKind;
use crate::types::{DeliveryAck, MediaRef, RecipientId, UploadedArtifact};

/// Boxed future returned by every remote call.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote asked us to wait before calling again.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote refused this particular request; a retry may succeed.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Not retryable under any circumstances.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Remote chunked-upload protocol.
pub trait UploadTransport: Send + Sync {
    /// Commits one part of a small-mode session.
    fn commit_part_small(&self, session_id: i64, part_index: u32, bytes: Bytes)
    -> RemoteFuture<'_, ()>;

    /// Commits one part of a big-mode session, declaring the total part count.
    fn commit_part_big(
        &self,
        session_id: i64,
        part_index: u32,
        total_parts: u32,
        bytes: Bytes,
    ) -> RemoteFuture<'_, ()>;

    /// Drops whatever a failed session left behind. Backends that keep
    /// nothing for abandoned sessions can rely on the default.
    fn discard(&self, session_id: i64) -> RemoteFuture<'_, ()> {
        let _ = session_id;
        Box::pin(async { Ok(()) })
    }
}

/// Turns a committed upload into a deliverable reference.
pub trait ArtifactFinalizer: Send + Sync {
    fn finalize<'a>(
        &'a self,
        artifact: &'a UploadedArtifact,
        kind: MediaKind,
    ) -> RemoteFuture<'a, MediaRef>;
}

/// Remote messaging used to hand artifacts to a recipient.
pub trait DeliveryTransport: Send + Sync {
    /// Sends several references as one group. The result may hold fewer
    /// acknowledgements than references submitted.
    fn group_send<'a>(
        &'a self,
        recipient: &'a RecipientId,
        refs: &'a [MediaRef],
    ) -> RemoteFuture<'a, Vec<DeliveryAck>>;

    fn single_send<'a>(
        &'a self,
        recipient: &'a RecipientId,
        media: &'a MediaRef,
    ) -> RemoteFuture<'a, DeliveryAck>;
}

/// Receives rendered status text. Failures are never fatal to a transfer.
pub trait StatusSink: Send + Sync {
    fn render(&self, text: String) -> RemoteFuture<'_, ()>;
}
