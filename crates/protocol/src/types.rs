//! Upload and delivery value types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{BIG_FILE_THRESHOLD, BIG_MODE_WORKERS, SMALL_MODE_WORKERS};

/// Chunked-upload protocol mode, fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Parts committed without declaring the total count.
    Small,
    /// Parts committed together with the declared total part count.
    Big,
}

impl UploadMode {
    /// Selects the mode for a declared size using the default threshold.
    pub fn for_size(declared_size: u64) -> Self {
        Self::for_size_with_threshold(declared_size, BIG_FILE_THRESHOLD)
    }

    /// Selects the mode for a declared size: `Big` iff `size > threshold`.
    pub fn for_size_with_threshold(declared_size: u64, threshold: u64) -> Self {
        if declared_size > threshold {
            Self::Big
        } else {
            Self::Small
        }
    }

    /// Default concurrent commit workers for this mode.
    pub fn workers(self) -> usize {
        match self {
            Self::Big => BIG_MODE_WORKERS,
            Self::Small => SMALL_MODE_WORKERS,
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Big => write!(f, "big"),
        }
    }
}

/// Result of a fully committed upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedArtifact {
    pub session_id: i64,
    pub committed_part_count: u32,
    pub name: String,
    pub mode: UploadMode,
    pub size: u64,
}

/// Opaque remote handle of a finalized artifact, ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination of a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgement returned by the remote for one delivered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAck {
    pub message_id: i64,
}

impl DeliveryAck {
    pub fn new(message_id: i64) -> Self {
        Self { message_id }
    }
}
