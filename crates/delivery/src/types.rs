//! Data types for the delivery flow.

use std::collections::HashSet;
use std::time::Duration;

use mediarelay_protocol::constants::MAX_BATCH;
use mediarelay_protocol::{MediaKind, MediaRef};
use mediarelay_transfer::RetryPolicy;
use serde::{Deserialize, Serialize};

/// One finalized artifact awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub media: MediaRef,
    pub kind: MediaKind,
    pub name: String,
    pub size: u64,
}

/// Batching and pacing of a delivery run.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Upper bound for a group send; per-kind limits may be lower.
    pub max_batch: usize,
    /// Pause between two batches.
    pub batch_pause: Duration,
    /// Pause between two single sends of a fallback.
    pub single_pause: Duration,
    /// Wait before the safety net starts.
    pub safety_net_cooldown: Duration,
    /// Pause between two safety-net sends.
    pub safety_net_pause: Duration,
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_batch: MAX_BATCH,
            batch_pause: Duration::from_millis(1500),
            single_pause: Duration::from_millis(500),
            safety_net_cooldown: Duration::from_secs(2),
            safety_net_pause: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// References acknowledged during one delivery run. Only ever grows.
#[derive(Debug, Default)]
pub struct DeliveredSet {
    refs: HashSet<MediaRef>,
}

impl DeliveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the reference was not yet recorded.
    pub fn insert(&mut self, media: &MediaRef) -> bool {
        self.refs.insert(media.clone())
    }

    pub fn contains(&self, media: &MediaRef) -> bool {
        self.refs.contains(media)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Progress event emitted during delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    /// A group send was fully acknowledged.
    BatchDelivered { kind: MediaKind, count: usize },
    /// A group send acknowledged only part of the batch.
    BatchPartial {
        kind: MediaKind,
        submitted: usize,
        acknowledged: usize,
    },
    /// A group send failed; the batch is being sent item by item.
    BatchFallback {
        kind: MediaKind,
        count: usize,
        error: String,
    },
    SingleDelivered { name: String },
    SingleFailed { name: String, error: String },
    /// The safety net is about to resend missing items.
    SafetyNet { missing: usize },
    Finished { delivered: usize, total: usize },
}

/// Outcome of a delivery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub total: usize,
    pub delivered: usize,
    /// Items still undelivered after the safety net.
    pub missing: Vec<DeliveryItem>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// `delivered/total` summary line.
    pub fn summary(&self) -> String {
        if self.is_complete() {
            format!("Delivered {}/{} files", self.delivered, self.total)
        } else {
            let names: Vec<&str> = self.missing.iter().map(|i| i.name.as_str()).collect();
            format!(
                "Delivered {}/{} files, missing: {}",
                self.delivered,
                self.total,
                names.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> DeliveryItem {
        DeliveryItem {
            media: MediaRef::new(id),
            kind: MediaKind::Document,
            name: format!("{id}.pdf"),
            size: 1,
        }
    }

    #[test]
    fn delivered_set_grows_only() {
        let mut set = DeliveredSet::new();
        assert!(set.is_empty());
        assert!(set.insert(&MediaRef::new("a")));
        assert!(!set.insert(&MediaRef::new("a")));
        assert!(set.insert(&MediaRef::new("b")));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&MediaRef::new("a")));
    }

    #[test]
    fn report_summary() {
        let full = DeliveryReport {
            total: 2,
            delivered: 2,
            missing: vec![],
        };
        assert!(full.is_complete());
        assert_eq!(full.summary(), "Delivered 2/2 files");

        let short = DeliveryReport {
            total: 3,
            delivered: 1,
            missing: vec![item("x"), item("y")],
        };
        assert!(!short.is_complete());
        assert_eq!(short.summary(), "Delivered 1/3 files, missing: x.pdf, y.pdf");
    }

    #[test]
    fn report_serializes() {
        let report = DeliveryReport {
            total: 1,
            delivered: 0,
            missing: vec![item("z")],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"document\""));
        let back: DeliveryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
