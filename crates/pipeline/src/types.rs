//! Request and outcome types of a relay run.

use mediarelay_delivery::DeliveryReport;
use mediarelay_protocol::{RecipientId, UploadedArtifact};
use mediarelay_transfer::SourceProvider;
use serde::{Deserialize, Serialize};

/// One file to relay.
pub struct FileJob {
    pub provider: Box<dyn SourceProvider>,
    /// Relay queue capacity for this file; the configured default when `None`.
    pub relay_capacity: Option<usize>,
}

impl FileJob {
    pub fn new(provider: impl SourceProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            relay_capacity: None,
        }
    }

    pub fn with_relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = Some(capacity);
        self
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for FileJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJob")
            .field("name", &self.provider.name())
            .field("declared_size", &self.provider.declared_size())
            .field("relay_capacity", &self.relay_capacity)
            .finish()
    }
}

/// Everything a requester asked to relay in one go.
#[derive(Debug)]
pub struct TransferRequest {
    /// Key used for admission control.
    pub requester: String,
    pub recipient: RecipientId,
    pub files: Vec<FileJob>,
}

/// A file dropped after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Result of a relay run that reached the delivery stage.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub report: DeliveryReport,
    pub uploaded: Vec<UploadedArtifact>,
    pub skipped: Vec<SkippedFile>,
}

impl RelayOutcome {
    /// Every file uploaded and every artifact delivered.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.report.is_complete()
    }
}
