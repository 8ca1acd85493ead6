use std::collections::BTreeSet;
use std::time::Instant;

use bytes::Bytes;
use mediarelay_protocol::UploadMode;
use parking_lot::RwLock;
use rand::Rng;

/// One fixed-size slice of an upload.
#[derive(Debug, Clone)]
pub struct Part {
    pub index: u32,
    pub data: Bytes,
}

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
}

/// Tracks one chunked-upload session (thread-safe).
///
/// `total_parts` is fixed at creation from the declared size; committed
/// indices are recorded as their commits are confirmed.
pub struct UploadSession {
    session_id: i64,
    name: String,
    mode: UploadMode,
    part_size: usize,
    declared_size: u64,
    total_parts: u32,
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    status: SessionStatus,
    committed: BTreeSet<u32>,
    committed_bytes: u64,
    started_at: Instant,
    finished_at: Option<Instant>,
    error: Option<String>,
}

impl UploadSession {
    /// Creates a session with a fresh random 63-bit id.
    pub fn new(name: impl Into<String>, declared_size: u64, part_size: usize, big_threshold: u64) -> Self {
        let session_id = rand::thread_rng().gen_range(1..=i64::MAX);
        Self::with_id(session_id, name, declared_size, part_size, big_threshold)
    }

    pub fn with_id(
        session_id: i64,
        name: impl Into<String>,
        declared_size: u64,
        part_size: usize,
        big_threshold: u64,
    ) -> Self {
        let part_size = part_size.max(1);
        Self {
            session_id,
            name: name.into(),
            mode: UploadMode::for_size_with_threshold(declared_size, big_threshold),
            part_size,
            declared_size,
            total_parts: Self::total_parts_for(declared_size, part_size),
            inner: RwLock::new(SessionInner {
                status: SessionStatus::InProgress,
                committed: BTreeSet::new(),
                committed_bytes: 0,
                started_at: Instant::now(),
                finished_at: None,
                error: None,
            }),
        }
    }

    /// `ceil(declared_size / part_size)`, saturating at `u32::MAX`.
    pub fn total_parts_for(declared_size: u64, part_size: usize) -> u32 {
        let parts = declared_size.div_ceil(part_size.max(1) as u64);
        u32::try_from(parts).unwrap_or(u32::MAX)
    }

    /// Records a confirmed part. Returns `false` if the index was already committed.
    pub fn mark_committed(&self, index: u32, len: usize) -> bool {
        let mut s = self.inner.write();
        let fresh = s.committed.insert(index);
        if fresh {
            s.committed_bytes += len as u64;
        }
        fresh
    }

    pub fn is_committed(&self, index: u32) -> bool {
        self.inner.read().committed.contains(&index)
    }

    pub fn committed_count(&self) -> u32 {
        self.inner.read().committed.len() as u32
    }

    pub fn committed_bytes(&self) -> u64 {
        self.inner.read().committed_bytes
    }

    /// Indices in `[0, total_parts)` not yet committed.
    pub fn missing_parts(&self) -> Vec<u32> {
        let s = self.inner.read();
        (0..self.total_parts)
            .filter(|i| !s.committed.contains(i))
            .collect()
    }

    pub fn complete(&self) {
        let mut s = self.inner.write();
        s.status = SessionStatus::Completed;
        s.finished_at = Some(Instant::now());
    }

    pub fn fail(&self, err: &str) {
        let mut s = self.inner.write();
        s.status = SessionStatus::Failed;
        s.error = Some(err.to_string());
        s.finished_at = Some(Instant::now());
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().status
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    /// Wall time from creation until completion (or now, if still running).
    pub fn elapsed(&self) -> std::time::Duration {
        let s = self.inner.read();
        s.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(s.started_at)
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }
}
