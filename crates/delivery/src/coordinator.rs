//! Delivery coordinator.
//!
//! Sends batches, reconciles acknowledgements against what was submitted,
//! and resends whatever is still missing at the end.

use std::sync::Arc;

use mediarelay_protocol::{DeliveryTransport, MediaRef, RecipientId};
use mediarelay_transfer::with_retry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::batch::{Batch, plan_batches};
use crate::types::{DeliveredSet, DeliveryConfig, DeliveryEvent, DeliveryItem, DeliveryReport};

/// Delivers artifacts to a recipient with batching and a final safety net.
pub struct DeliveryCoordinator {
    transport: Arc<dyn DeliveryTransport>,
    config: DeliveryConfig,
    events_tx: mpsc::Sender<DeliveryEvent>,
    events_rx: Option<mpsc::Receiver<DeliveryEvent>>,
}

impl DeliveryCoordinator {
    pub fn new(transport: Arc<dyn DeliveryTransport>, config: DeliveryConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport,
            config,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DeliveryEvent>> {
        self.events_rx.take()
    }

    /// Delivers every item, returning which ones could not be delivered.
    ///
    /// Never fails as a whole: any shortfall is listed in the report.
    pub async fn deliver(&self, recipient: &RecipientId, items: &[DeliveryItem]) -> DeliveryReport {
        let mut delivered = DeliveredSet::new();
        let batches = plan_batches(items, self.config.max_batch);

        info!(%recipient, items = items.len(), batches = batches.len(), "delivery started");

        for (i, batch) in batches.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_pause).await;
            }
            self.send_batch(recipient, batch, &mut delivered).await;
        }

        let missing = missing_items(items, &delivered);
        if !missing.is_empty() {
            warn!(%recipient, missing = missing.len(), "safety net resending missing items");
            self.emit(DeliveryEvent::SafetyNet {
                missing: missing.len(),
            });
            tokio::time::sleep(self.config.safety_net_cooldown).await;
            let mut sent = 0;
            for item in &missing {
                // A repeated reference may already have gone out earlier in this loop.
                if delivered.contains(&item.media) {
                    continue;
                }
                if sent > 0 {
                    tokio::time::sleep(self.config.safety_net_pause).await;
                }
                self.send_single(recipient, item, &mut delivered).await;
                sent += 1;
            }
        }

        let missing = missing_items(items, &delivered);
        let report = DeliveryReport {
            total: items.len(),
            delivered: items.iter().filter(|i| delivered.contains(&i.media)).count(),
            missing,
        };
        self.emit(DeliveryEvent::Finished {
            delivered: report.delivered,
            total: report.total,
        });
        if report.is_complete() {
            info!(%recipient, delivered = report.delivered, total = report.total, "delivery finished");
        } else {
            warn!(
                %recipient,
                delivered = report.delivered,
                total = report.total,
                "delivery finished with missing items"
            );
        }
        report
    }

    async fn send_batch(&self, recipient: &RecipientId, batch: &Batch, delivered: &mut DeliveredSet) {
        if batch.len() == 1 {
            self.send_single(recipient, &batch.items[0], delivered).await;
            return;
        }

        let refs: Vec<MediaRef> = batch.items.iter().map(|i| i.media.clone()).collect();
        let n = refs.len();
        let transport = self.transport.as_ref();
        let result = with_retry(&self.config.retry, "group send", || {
            transport.group_send(recipient, &refs)
        })
        .await;

        match result {
            Ok(acks) if !acks.is_empty() => {
                let k = acks.len().min(n);
                for item in &batch.items[..k] {
                    delivered.insert(&item.media);
                }
                if k == n {
                    debug!(%recipient, kind = %batch.kind, count = n, "batch delivered");
                    self.emit(DeliveryEvent::BatchDelivered {
                        kind: batch.kind,
                        count: n,
                    });
                } else {
                    warn!(
                        %recipient,
                        kind = %batch.kind,
                        submitted = n,
                        acknowledged = k,
                        "group send partially acknowledged"
                    );
                    self.emit(DeliveryEvent::BatchPartial {
                        kind: batch.kind,
                        submitted: n,
                        acknowledged: k,
                    });
                }
            }
            outcome => {
                let error = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "no acknowledgements".to_string(),
                };
                warn!(%recipient, kind = %batch.kind, count = n, error = %error, "group send failed, sending individually");
                self.emit(DeliveryEvent::BatchFallback {
                    kind: batch.kind,
                    count: n,
                    error,
                });
                for (i, item) in batch.items.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(self.config.single_pause).await;
                    }
                    self.send_single(recipient, item, delivered).await;
                }
            }
        }
    }

    async fn send_single(&self, recipient: &RecipientId, item: &DeliveryItem, delivered: &mut DeliveredSet) {
        let transport = self.transport.as_ref();
        let result = with_retry(&self.config.retry, "single send", || {
            transport.single_send(recipient, &item.media)
        })
        .await;
        match result {
            Ok(ack) => {
                delivered.insert(&item.media);
                debug!(%recipient, name = %item.name, message_id = ack.message_id, "item delivered");
                self.emit(DeliveryEvent::SingleDelivered {
                    name: item.name.clone(),
                });
            }
            Err(e) => {
                warn!(%recipient, name = %item.name, error = %e, "single send failed");
                self.emit(DeliveryEvent::SingleFailed {
                    name: item.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: DeliveryEvent) {
        // Dropped when nobody listens or the buffer is full.
        let _ = self.events_tx.try_send(event);
    }
}

/// Items whose reference is not delivered, one entry per item.
fn missing_items(items: &[DeliveryItem], delivered: &DeliveredSet) -> Vec<DeliveryItem> {
    items
        .iter()
        .filter(|i| !delivered.contains(&i.media))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use mediarelay_protocol::{DeliveryAck, MediaKind, RemoteError, RemoteFuture};

    #[derive(Default)]
    struct MockTransport {
        /// Scripted group-send outcomes, consumed in order; default acks all.
        group_responses: Mutex<Vec<Result<usize, RemoteError>>>,
        /// Refs whose single sends always fail.
        single_failures: Mutex<HashMap<MediaRef, RemoteError>>,
        /// Refs whose first single send fails, then succeed.
        single_fail_once: Mutex<Vec<MediaRef>>,
        group_calls: Mutex<Vec<Vec<MediaRef>>>,
        single_calls: Mutex<Vec<MediaRef>>,
    }

    impl DeliveryTransport for MockTransport {
        fn group_send<'a>(
            &'a self,
            _recipient: &'a RecipientId,
            refs: &'a [MediaRef],
        ) -> RemoteFuture<'a, Vec<DeliveryAck>> {
            self.group_calls.lock().unwrap().push(refs.to_vec());
            let scripted = {
                let mut responses = self.group_responses.lock().unwrap();
                if responses.is_empty() {
                    Ok(refs.len())
                } else {
                    responses.remove(0)
                }
            };
            Box::pin(async move {
                let k = scripted?;
                Ok::<_, RemoteError>((0..k as i64).map(DeliveryAck::new).collect())
            })
        }

        fn single_send<'a>(
            &'a self,
            _recipient: &'a RecipientId,
            media: &'a MediaRef,
        ) -> RemoteFuture<'a, DeliveryAck> {
            self.single_calls.lock().unwrap().push(media.clone());
            let permanent = self.single_failures.lock().unwrap().get(media).cloned();
            let once = {
                let mut once = self.single_fail_once.lock().unwrap();
                match once.iter().position(|m| m == media) {
                    Some(pos) => {
                        once.remove(pos);
                        true
                    }
                    None => false,
                }
            };
            Box::pin(async move {
                if let Some(err) = permanent {
                    return Err(err);
                }
                if once {
                    return Err(RemoteError::Permanent("flaky".into()));
                }
                Ok(DeliveryAck::new(1))
            })
        }
    }

    fn items(prefix: &str, kind: MediaKind, n: usize) -> Vec<DeliveryItem> {
        (0..n)
            .map(|i| DeliveryItem {
                media: MediaRef::new(format!("{prefix}{i}")),
                kind,
                name: format!("{prefix}{i}"),
                size: 100,
            })
            .collect()
    }

    fn recipient() -> RecipientId {
        RecipientId::new("user-1")
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_delivered() {
        let transport = Arc::new(MockTransport::default());
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let photos = items("p", MediaKind::Photo, 8);

        let report = coordinator.deliver(&recipient(), &photos).await;
        assert_eq!(report.delivered, 8);
        assert!(report.is_complete());
        assert_eq!(transport.group_calls.lock().unwrap().len(), 1);
        assert!(transport.single_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_ack_recovered_by_safety_net() {
        let transport = Arc::new(MockTransport::default());
        transport.group_responses.lock().unwrap().push(Ok(5));
        let mut coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let mut events = coordinator.take_events().unwrap();
        let photos = items("p", MediaKind::Photo, 8);

        let report = coordinator.deliver(&recipient(), &photos).await;

        assert_eq!(report.delivered, 8);
        assert_eq!(report.total, 8);
        assert!(report.missing.is_empty());
        let singles = transport.single_calls.lock().unwrap().clone();
        assert_eq!(
            singles,
            vec![MediaRef::new("p5"), MediaRef::new("p6"), MediaRef::new("p7")]
        );

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            seen.push(ev);
        }
        assert!(seen.contains(&DeliveryEvent::BatchPartial {
            kind: MediaKind::Photo,
            submitted: 8,
            acknowledged: 5
        }));
        assert!(seen.contains(&DeliveryEvent::SafetyNet { missing: 3 }));
        assert_eq!(
            seen.last(),
            Some(&DeliveryEvent::Finished {
                delivered: 8,
                total: 8
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_group_send_falls_back_to_singles() {
        let transport = Arc::new(MockTransport::default());
        transport
            .group_responses
            .lock()
            .unwrap()
            .push(Err(RemoteError::Permanent("album rejected".into())));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let videos = items("v", MediaKind::Video, 3);

        let report = coordinator.deliver(&recipient(), &videos).await;
        assert_eq!(report.delivered, 3);
        assert_eq!(transport.group_calls.lock().unwrap().len(), 1);
        assert_eq!(transport.single_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_acks_fall_back_to_singles() {
        let transport = Arc::new(MockTransport::default());
        transport.group_responses.lock().unwrap().push(Ok(0));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());

        let report = coordinator.deliver(&recipient(), &items("p", MediaKind::Photo, 2)).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(transport.single_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_group_send_is_retried() {
        let transport = Arc::new(MockTransport::default());
        transport.group_responses.lock().unwrap().push(Err(RemoteError::RateLimited {
            retry_after: Duration::from_secs(5),
        }));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());

        let start = tokio::time::Instant::now();
        let report = coordinator.deliver(&recipient(), &items("p", MediaKind::Photo, 4)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(report.delivered, 4);
        assert_eq!(transport.group_calls.lock().unwrap().len(), 2);
        assert!(transport.single_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn safety_net_retries_failed_single() {
        let transport = Arc::new(MockTransport::default());
        transport
            .single_fail_once
            .lock()
            .unwrap()
            .push(MediaRef::new("d0"));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());

        let report = coordinator.deliver(&recipient(), &items("d", MediaKind::Document, 2)).await;
        assert_eq!(report.delivered, 2);
        let calls = transport.single_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![MediaRef::new("d0"), MediaRef::new("d1"), MediaRef::new("d0")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shortfall_is_reported_not_dropped() {
        let transport = Arc::new(MockTransport::default());
        transport
            .single_failures
            .lock()
            .unwrap()
            .insert(MediaRef::new("a1"), RemoteError::Permanent("too big".into()));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());

        let report = coordinator.deliver(&recipient(), &items("a", MediaKind::Audio, 3)).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].name, "a1");
        assert_eq!(report.total - report.delivered, report.missing.len());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reference_counted_per_item() {
        let transport = Arc::new(MockTransport::default());
        transport
            .group_responses
            .lock()
            .unwrap()
            .push(Err(RemoteError::Permanent("album rejected".into())));
        transport
            .single_failures
            .lock()
            .unwrap()
            .insert(MediaRef::new("same"), RemoteError::Permanent("gone".into()));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let twice: Vec<DeliveryItem> = ["first.jpg", "second.jpg"]
            .iter()
            .map(|name| DeliveryItem {
                media: MediaRef::new("same"),
                kind: MediaKind::Photo,
                name: name.to_string(),
                size: 100,
            })
            .collect();

        let report = coordinator.deliver(&recipient(), &twice).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.missing.len(), 2);
        assert_eq!(report.total - report.delivered, report.missing.len());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reference_delivered_once_counts_both() {
        let transport = Arc::new(MockTransport::default());
        transport.group_responses.lock().unwrap().push(Ok(0));
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let twice: Vec<DeliveryItem> = (0..2)
            .map(|i| DeliveryItem {
                media: MediaRef::new("same"),
                kind: MediaKind::Photo,
                name: format!("copy{i}.jpg"),
                size: 100,
            })
            .collect();

        let report = coordinator.deliver(&recipient(), &twice).await;
        assert_eq!(report.delivered, 2);
        assert!(report.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_kinds_in_delivery_order() {
        let transport = Arc::new(MockTransport::default());
        let coordinator = DeliveryCoordinator::new(transport.clone(), DeliveryConfig::default());
        let mut all = items("d", MediaKind::Document, 1);
        all.extend(items("v", MediaKind::Video, 2));
        all.extend(items("p", MediaKind::Photo, 2));

        let report = coordinator.deliver(&recipient(), &all).await;
        assert!(report.is_complete());
        let groups = transport.group_calls.lock().unwrap().clone();
        assert_eq!(groups[0], vec![MediaRef::new("p0"), MediaRef::new("p1")]);
        assert_eq!(groups[1], vec![MediaRef::new("v0"), MediaRef::new("v1")]);
        assert_eq!(*transport.single_calls.lock().unwrap(), vec![MediaRef::new("d0")]);
    }

    #[tokio::test]
    async fn empty_delivery() {
        let coordinator = DeliveryCoordinator::new(Arc::new(MockTransport::default()), DeliveryConfig::default());
        let report = coordinator.deliver(&recipient(), &[]).await;
        assert_eq!(report.total, 0);
        assert!(report.is_complete());
    }
}
