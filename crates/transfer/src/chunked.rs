use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use mediarelay_protocol::constants::{
    BIG_FILE_THRESHOLD, BIG_MODE_WORKERS, PART_SIZE, SMALL_MODE_WORKERS,
};
use mediarelay_protocol::{UploadMode, UploadTransport, UploadedArtifact};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::TransferError;
use crate::relay::{ByteCallback, StreamRelay};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{Part, UploadSession};

/// Part sizing and concurrency of a [`ChunkedUploader`].
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub part_size: usize,
    pub big_file_threshold: u64,
    pub big_mode_workers: usize,
    pub small_mode_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            part_size: PART_SIZE,
            big_file_threshold: BIG_FILE_THRESHOLD,
            big_mode_workers: BIG_MODE_WORKERS,
            small_mode_workers: SMALL_MODE_WORKERS,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploaderConfig {
    fn workers(&self, mode: UploadMode) -> usize {
        match mode {
            UploadMode::Big => self.big_mode_workers,
            UploadMode::Small => self.small_mode_workers,
        }
        .max(1)
    }
}

/// Slices a relayed stream into fixed-size parts and commits them concurrently.
pub struct ChunkedUploader {
    transport: Arc<dyn UploadTransport>,
    config: UploaderConfig,
    on_upload: Option<ByteCallback>,
}

impl ChunkedUploader {
    pub fn new(transport: Arc<dyn UploadTransport>, config: UploaderConfig) -> Self {
        Self {
            transport,
            config,
            on_upload: None,
        }
    }

    /// Registers a callback invoked with each committed part's length.
    pub fn with_upload_observer(mut self, observer: ByteCallback) -> Self {
        self.on_upload = Some(observer);
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Drains `relay` into a new upload session.
    ///
    /// Every call starts a fresh session; a failed upload cannot be resumed.
    pub async fn upload(&self, relay: &mut StreamRelay) -> Result<UploadedArtifact, TransferError> {
        let session = Arc::new(UploadSession::new(
            relay.name(),
            relay.declared_size(),
            self.config.part_size,
            self.config.big_file_threshold,
        ));
        let result = self.run(relay, &session).await;
        match &result {
            Ok(artifact) => {
                session.complete();
                info!(
                    session_id = artifact.session_id,
                    name = %artifact.name,
                    parts = artifact.committed_part_count,
                    elapsed_ms = session.elapsed().as_millis() as u64,
                    "upload finished"
                );
            }
            Err(e) => {
                session.fail(&e.to_string());
                error!(session_id = session.session_id(), name = %session.name(), error = %e, "upload aborted");
                if let Err(cleanup) = self.transport.discard(session.session_id()).await {
                    warn!(session_id = session.session_id(), error = %cleanup, "discarding parts failed");
                }
            }
        }
        result
    }

    async fn run(
        &self,
        relay: &mut StreamRelay,
        session: &Arc<UploadSession>,
    ) -> Result<UploadedArtifact, TransferError> {
        let part_size = session.part_size();
        let workers = self.config.workers(session.mode());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut pending: JoinSet<Result<u32, TransferError>> = JoinSet::new();
        let mut buffer = BytesMut::with_capacity(part_size);
        let mut next_index: u32 = 0;

        info!(
            session_id = session.session_id(),
            name = %session.name(),
            size = session.declared_size(),
            mode = %session.mode(),
            total_parts = session.total_parts(),
            workers,
            "upload session started"
        );

        loop {
            let chunk = relay.read().await;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= part_size {
                let data = buffer.split_to(part_size).freeze();
                self.dispatch(&mut pending, &semaphore, session, Part { index: next_index, data });
                next_index += 1;
                reap(&mut pending, workers * 2).await?;
            }
        }

        // A short final part seals a small-mode upload, so the tail is only
        // dispatched once the stream is known to be whole.
        if let Some(err) = relay.producer_error() {
            cancel(&mut pending).await;
            return Err(TransferError::ProducerFailure(err));
        }
        let received = relay.tell();
        if received == 0 && next_index == 0 {
            return Err(TransferError::EmptySource);
        }
        if received < session.declared_size() {
            cancel(&mut pending).await;
            return Err(TransferError::ProducerFailure(format!(
                "stream ended after {received} of {} bytes",
                session.declared_size()
            )));
        }

        if !buffer.is_empty() {
            let data: Bytes = buffer.split().freeze();
            self.dispatch(&mut pending, &semaphore, session, Part { index: next_index, data });
        }
        reap(&mut pending, 1).await?;

        let committed = session.committed_count();
        if committed != session.total_parts() {
            warn!(
                session_id = session.session_id(),
                committed,
                expected = session.total_parts(),
                "part count mismatch"
            );
        }

        Ok(UploadedArtifact {
            session_id: session.session_id(),
            committed_part_count: committed,
            name: session.name().to_string(),
            mode: session.mode(),
            size: received,
        })
    }

    fn dispatch(
        &self,
        pending: &mut JoinSet<Result<u32, TransferError>>,
        semaphore: &Arc<Semaphore>,
        session: &Arc<UploadSession>,
        part: Part,
    ) {
        let transport = Arc::clone(&self.transport);
        let semaphore = Arc::clone(semaphore);
        let session = Arc::clone(session);
        let policy = self.config.retry.clone();
        let observer = self.on_upload.clone();

        pending.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| TransferError::Task(e.to_string()))?;

            let Part { index, data } = part;
            let len = data.len();
            let session_id = session.session_id();
            let total_parts = session.total_parts();
            let mode = session.mode();
            let transport: &dyn UploadTransport = transport.as_ref();

            with_retry(&policy, "commit part", || {
                let bytes = data.clone();
                match mode {
                    UploadMode::Small => transport.commit_part_small(session_id, index, bytes),
                    UploadMode::Big => {
                        transport.commit_part_big(session_id, index, total_parts, bytes)
                    }
                }
            })
            .await
            .map_err(|source| TransferError::PartCommit {
                part: index,
                source,
            })?;

            if !session.mark_committed(index, len) {
                warn!(session_id, part = index, "part committed twice");
            }
            if let Some(cb) = &observer {
                cb(len as u64);
            }
            debug!(session_id, part = index, len, "part committed");
            Ok(index)
        });
    }
}

/// Joins finished commits until fewer than `limit` remain in flight.
///
/// The first failure aborts every other in-flight commit.
async fn reap(
    pending: &mut JoinSet<Result<u32, TransferError>>,
    limit: usize,
) -> Result<(), TransferError> {
    while let Some(joined) = pending.try_join_next() {
        check(pending, joined)?;
    }
    while pending.len() >= limit.max(1) {
        match pending.join_next().await {
            Some(joined) => check(pending, joined)?,
            None => break,
        }
    }
    Ok(())
}

/// Aborts in-flight commits and waits until none of them can still land.
async fn cancel(pending: &mut JoinSet<Result<u32, TransferError>>) {
    pending.abort_all();
    while pending.join_next().await.is_some() {}
}

fn check(
    pending: &mut JoinSet<Result<u32, TransferError>>,
    joined: Result<Result<u32, TransferError>, tokio::task::JoinError>,
) -> Result<(), TransferError> {
    let outcome = joined
        .map_err(|e| TransferError::Task(e.to_string()))
        .and_then(|r| r.map(|_| ()));
    if outcome.is_err() {
        pending.abort_all();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use mediarelay_protocol::{RemoteError, RemoteFuture};

    use super::*;
    use crate::source::{ChunkStream, MemorySource, Source, SourceError};

    /// Records committed parts; optionally fails scripted (index, attempt) pairs.
    #[derive(Default)]
    struct MockTransport {
        parts: Mutex<HashMap<u32, Bytes>>,
        big_totals: Mutex<Vec<u32>>,
        attempts: Mutex<HashMap<u32, u32>>,
        failures: Mutex<HashMap<u32, Vec<RemoteError>>>,
        discarded: Mutex<Vec<i64>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl MockTransport {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn fail_part(&self, index: u32, errors: Vec<RemoteError>) {
            self.failures.lock().unwrap().insert(index, errors);
        }

        fn assembled(&self) -> Vec<u8> {
            let parts = self.parts.lock().unwrap();
            let mut indices: Vec<_> = parts.keys().copied().collect();
            indices.sort();
            indices.iter().flat_map(|i| parts[i].to_vec()).collect()
        }

        fn commit(&self, index: u32, bytes: Bytes) -> RemoteFuture<'_, ()> {
            Box::pin(async move {
                *self.attempts.lock().unwrap().entry(index).or_default() += 1;
                let scripted = {
                    let mut failures = self.failures.lock().unwrap();
                    failures.get_mut(&index).and_then(|errs| {
                        if errs.is_empty() { None } else { Some(errs.remove(0)) }
                    })
                };
                if let Some(err) = scripted {
                    return Err(err);
                }

                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                self.parts.lock().unwrap().insert(index, bytes);
                Ok(())
            })
        }
    }

    impl UploadTransport for MockTransport {
        fn commit_part_small(&self, _session_id: i64, part_index: u32, bytes: Bytes) -> RemoteFuture<'_, ()> {
            self.commit(part_index, bytes)
        }

        fn commit_part_big(
            &self,
            _session_id: i64,
            part_index: u32,
            total_parts: u32,
            bytes: Bytes,
        ) -> RemoteFuture<'_, ()> {
            self.big_totals.lock().unwrap().push(total_parts);
            self.commit(part_index, bytes)
        }

        fn discard(&self, session_id: i64) -> RemoteFuture<'_, ()> {
            self.discarded.lock().unwrap().push(session_id);
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingSource {
        good: Bytes,
        declared: u64,
    }

    impl Source for FailingSource {
        fn name(&self) -> &str {
            "broken.bin"
        }

        fn declared_size(&self) -> u64 {
            self.declared
        }

        fn produce(self: Box<Self>) -> ChunkStream {
            Box::pin(futures_util::stream::iter(vec![
                Ok(self.good.clone()),
                Err(SourceError::Http("connection reset".into())),
            ]))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn small_config(part_size: usize) -> UploaderConfig {
        UploaderConfig {
            part_size,
            big_file_threshold: (part_size * 4) as u64,
            ..UploaderConfig::default()
        }
    }

    #[tokio::test]
    async fn five_megabyte_scenario() {
        let data = pattern(5_000_000);
        let transport = Arc::new(MockTransport::default());
        let uploader = ChunkedUploader::new(transport.clone(), UploaderConfig::default());
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("five.bin", data.clone(), 64 * 1024)), 5);

        let artifact = uploader.upload(&mut relay).await.unwrap();

        assert_eq!(artifact.mode, UploadMode::Small);
        assert_eq!(artifact.committed_part_count, 10);
        assert_eq!(artifact.size, 5_000_000);
        let parts = transport.parts.lock().unwrap();
        assert_eq!(parts.len(), 10);
        for i in 0..9 {
            assert_eq!(parts[&i].len(), 524_288);
        }
        assert_eq!(parts[&9].len(), 227_520);
        drop(parts);
        assert_eq!(transport.assembled(), data);
    }

    #[tokio::test]
    async fn big_mode_declares_total_parts() {
        let data = pattern(1000);
        let transport = Arc::new(MockTransport::default());
        let uploader = ChunkedUploader::new(transport.clone(), small_config(100));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("big.bin", data.clone(), 33)), 5);

        let artifact = uploader.upload(&mut relay).await.unwrap();
        assert_eq!(artifact.mode, UploadMode::Big);
        assert_eq!(artifact.committed_part_count, 10);
        let totals = transport.big_totals.lock().unwrap();
        assert_eq!(totals.len(), 10);
        assert!(totals.iter().all(|t| *t == 10));
        drop(totals);
        assert_eq!(transport.assembled(), data);
    }

    #[tokio::test(start_paused = true)]
    async fn big_mode_bounds_concurrency() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(200)));
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("b", pattern(500), 10)), 5);

        let artifact = uploader.upload(&mut relay).await.unwrap();
        assert_eq!(artifact.committed_part_count, 50);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn small_mode_commits_one_at_a_time() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(50)));
        let uploader = ChunkedUploader::new(transport.clone(), small_config(100));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("s", pattern(350), 20)), 5);

        let artifact = uploader.upload(&mut relay).await.unwrap();
        assert_eq!(artifact.mode, UploadMode::Small);
        assert_eq!(artifact.committed_part_count, 4);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_part_is_retried() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_part(
            1,
            vec![RemoteError::RateLimited {
                retry_after: Duration::from_secs(5),
            }],
        );
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("r", pattern(30), 10)), 5);

        let start = tokio::time::Instant::now();
        let artifact = uploader.upload(&mut relay).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(artifact.committed_part_count, 3);
        assert_eq!(transport.attempts.lock().unwrap()[&1], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_part_aborts_transfer() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_part(0, vec![RemoteError::Rejected("bad".into()); 3]);
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("x", pattern(30), 10)), 5);

        let err = uploader.upload(&mut relay).await.unwrap_err();
        assert!(matches!(err, TransferError::PartCommit { part: 0, .. }));
        assert_eq!(transport.attempts.lock().unwrap()[&0], 3);
    }

    #[tokio::test]
    async fn empty_source_fails() {
        let uploader = ChunkedUploader::new(Arc::new(MockTransport::default()), UploaderConfig::default());
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("e", Bytes::new(), 8)), 5);
        let err = uploader.upload(&mut relay).await.unwrap_err();
        assert!(matches!(err, TransferError::EmptySource));
    }

    #[tokio::test]
    async fn short_stream_is_producer_failure() {
        let uploader = ChunkedUploader::new(Arc::new(MockTransport::default()), small_config(10));
        let source = MemorySource::new("short", pattern(25), 10).with_declared_size(40);
        let mut relay = StreamRelay::new(Box::new(source), 5);
        let err = uploader.upload(&mut relay).await.unwrap_err();
        assert!(matches!(err, TransferError::ProducerFailure(_)));
    }

    #[tokio::test]
    async fn failing_producer_is_producer_failure() {
        let uploader = ChunkedUploader::new(Arc::new(MockTransport::default()), small_config(10));
        let source = FailingSource {
            good: Bytes::from(pattern(15)),
            declared: 100,
        };
        let mut relay = StreamRelay::new(Box::new(source), 5);
        let err = uploader.upload(&mut relay).await.unwrap_err();
        match err {
            TransferError::ProducerFailure(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn producer_failure_never_commits_tail() {
        let transport = Arc::new(MockTransport::default());
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let source = FailingSource {
            good: Bytes::from(pattern(15)),
            declared: 100,
        };
        let mut relay = StreamRelay::new(Box::new(source), 5);

        let err = uploader.upload(&mut relay).await.unwrap_err();
        assert!(matches!(err, TransferError::ProducerFailure(_)));

        let parts = transport.parts.lock().unwrap();
        assert!(!parts.contains_key(&1));
        assert!(parts.values().all(|p| p.len() == 10));
        assert!(!transport.attempts.lock().unwrap().contains_key(&1));
    }

    #[tokio::test]
    async fn short_stream_never_commits_tail() {
        let transport = Arc::new(MockTransport::default());
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let source = MemorySource::new("short", pattern(25), 25).with_declared_size(40);
        let mut relay = StreamRelay::new(Box::new(source), 5);

        let err = uploader.upload(&mut relay).await.unwrap_err();
        assert!(matches!(err, TransferError::ProducerFailure(_)));
        assert!(!transport.attempts.lock().unwrap().contains_key(&2));
    }

    #[tokio::test]
    async fn failed_upload_discards_session() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_part(0, vec![RemoteError::Permanent("bad".into())]);
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("d", pattern(30), 10)), 5);

        uploader.upload(&mut relay).await.unwrap_err();
        assert_eq!(transport.discarded.lock().unwrap().len(), 1);

        let mut ok = StreamRelay::new(Box::new(MemorySource::new("d", pattern(30), 10)), 5);
        uploader.upload(&mut ok).await.unwrap();
        assert_eq!(transport.discarded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overlong_stream_only_warns() {
        let transport = Arc::new(MockTransport::default());
        let uploader = ChunkedUploader::new(transport.clone(), small_config(10));
        let source = MemorySource::new("long", pattern(35), 10).with_declared_size(20);
        let mut relay = StreamRelay::new(Box::new(source), 5);
        let artifact = uploader.upload(&mut relay).await.unwrap();
        assert_eq!(artifact.committed_part_count, 4);
        assert_eq!(artifact.size, 35);
    }

    #[tokio::test]
    async fn upload_observer_counts_committed_bytes() {
        let seen = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&seen);
        let uploader = ChunkedUploader::new(Arc::new(MockTransport::default()), small_config(10))
            .with_upload_observer(Arc::new(move |n| {
                s.fetch_add(n, Ordering::SeqCst);
            }));
        let mut relay = StreamRelay::new(Box::new(MemorySource::new("o", pattern(95), 7)), 5);
        uploader.upload(&mut relay).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 95);
    }

    #[tokio::test]
    async fn fresh_session_per_upload() {
        let uploader = ChunkedUploader::new(Arc::new(MockTransport::default()), small_config(10));
        let mut a = StreamRelay::new(Box::new(MemorySource::new("a", pattern(10), 10)), 5);
        let mut b = StreamRelay::new(Box::new(MemorySource::new("a", pattern(10), 10)), 5);
        let first = uploader.upload(&mut a).await.unwrap();
        let second = uploader.upload(&mut b).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
    }
}
