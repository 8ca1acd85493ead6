//! Streaming relay, chunked upload and progress tracking.
//!
//! A [`Source`] is drained by a [`StreamRelay`] through a bounded queue, the
//! [`ChunkedUploader`] slices the relayed bytes into fixed-size parts and
//! commits them concurrently, and a [`ProgressTracker`] observes both sides.

mod chunked;
mod format;
mod local;
mod progress;
mod relay;
mod retry;
mod source;
mod types;
mod validation;

use mediarelay_protocol::RemoteError;

pub use chunked::{ChunkedUploader, UploaderConfig};
pub use format::{eta_text, human_bytes, human_speed, progress_bar, render_status, truncate_name};
pub use local::LocalPartStore;
pub use progress::{Phase, ProgressSnapshot, ProgressTracker, SpeedCalculator, TrackerConfig};
pub use relay::{ByteCallback, StreamRelay};
pub use retry::{RetryPolicy, with_retry};
pub use source::{
    ChunkStream, MemoryProvider, MemorySource, OpenFuture, Source, SourceError, SourceProvider,
};
pub use types::{Part, SessionStatus, UploadSession};
pub use validation::validate_artifact_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source failed or ended before its declared size.
    #[error("producer failure: {0}")]
    ProducerFailure(String),

    /// The source ended without producing a single byte.
    #[error("source produced no data")]
    EmptySource,

    #[error("part {part} rejected: {source}")]
    PartCommit { part: u32, source: RemoteError },

    #[error("commit task failed: {0}")]
    Task(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}
