//! One active transfer per requester.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::PipelineError;

/// Tracks which requesters currently have a transfer running.
#[derive(Debug, Clone, Default)]
pub struct AdmissionControl {
    active: Arc<Mutex<HashSet<String>>>,
}

impl AdmissionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transfer for `requester`, or fails with [`PipelineError::Busy`].
    ///
    /// The entry is held until the returned guard is dropped.
    pub fn try_admit(&self, requester: &str) -> Result<TransferGuard, PipelineError> {
        let mut active = self.active.lock();
        if !active.insert(requester.to_string()) {
            return Err(PipelineError::Busy {
                requester: requester.to_string(),
            });
        }
        debug!(requester, "transfer admitted");
        Ok(TransferGuard {
            active: Arc::clone(&self.active),
            requester: requester.to_string(),
        })
    }

    pub fn is_active(&self, requester: &str) -> bool {
        self.active.lock().contains(requester)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Releases the requester's slot on drop.
#[derive(Debug)]
pub struct TransferGuard {
    active: Arc<Mutex<HashSet<String>>>,
    requester: String,
}

impl TransferGuard {
    pub fn requester(&self) -> &str {
        &self.requester
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.requester);
        debug!(requester = %self.requester, "transfer released");
    }
}
