//! Pipeline error types.

use mediarelay_protocol::RemoteError;
use mediarelay_transfer::{SourceError, TransferError};

/// Errors that end a relay run before anything is delivered.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("a transfer is already running for {requester}")]
    Busy { requester: String },

    #[error("request contains no files")]
    EmptyRequest,

    /// Files above the size ceiling, rejected before any transfer starts.
    #[error("files too large: {}", files.join(", "))]
    Oversized { files: Vec<String> },

    #[error("no file could be uploaded ({skipped} skipped)")]
    NothingUploaded { skipped: usize },

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}
