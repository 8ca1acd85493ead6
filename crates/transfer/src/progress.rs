use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use mediarelay_protocol::StatusSink;
use mediarelay_protocol::constants::{
    REMOTE_CALL_TIMEOUT, SPEED_SAMPLE_CAP, SPEED_WINDOW, STATUS_INTERVAL,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::format::render_status;
use crate::relay::ByteCallback;

/// Intervals used by a [`ProgressTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between periodic renders.
    pub interval: Duration,
    /// Trailing window for rolling speed.
    pub speed_window: Duration,
    /// Samples retained per direction.
    pub sample_cap: usize,
    /// Longest a single render may take before it is abandoned.
    pub render_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval: STATUS_INTERVAL,
            speed_window: SPEED_WINDOW,
            sample_cap: SPEED_SAMPLE_CAP,
            render_timeout: REMOTE_CALL_TIMEOUT,
        }
    }
}

/// Coarse stage of a transfer, shown in the status header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Downloading,
    Uploading,
    Finalizing,
    Retrying { attempt: u32 },
    Done,
}

impl Phase {
    pub fn label(&self) -> String {
        match self {
            Self::Connecting => "connecting".into(),
            Self::Downloading => "downloading".into(),
            Self::Uploading => "uploading".into(),
            Self::Finalizing => "finalizing".into(),
            Self::Retrying { attempt } => format!("retrying (attempt {attempt})"),
            Self::Done => "done".into(),
        }
    }
}

/// Point-in-time view of a transfer, used for rendering.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub name: String,
    pub file_index: usize,
    pub file_count: usize,
    pub total_bytes: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub download_eta: Option<Duration>,
    pub upload_eta: Option<Duration>,
    pub phase: Phase,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn download_fraction(&self) -> f64 {
        fraction(self.downloaded, self.total_bytes)
    }

    pub fn upload_fraction(&self) -> f64 {
        fraction(self.uploaded, self.total_bytes)
    }
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).min(1.0)
    }
}

/// Observes both sides of a transfer and pushes periodic status renders.
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

struct TrackerInner {
    sink: Arc<dyn StatusSink>,
    config: TrackerConfig,
    name: String,
    total_bytes: AtomicU64,
    file_index: usize,
    file_count: usize,
    started_at: Instant,
    counters: RwLock<Counters>,
    download: SpeedCalculator,
    upload: SpeedCalculator,
}

#[derive(Default)]
struct Counters {
    downloaded: u64,
    uploaded: u64,
    pinned_phase: Option<Phase>,
}

impl ProgressTracker {
    /// Creates a tracker for file `file_index` (1-based) of `file_count`.
    pub fn new(
        sink: Arc<dyn StatusSink>,
        name: impl Into<String>,
        total_bytes: u64,
        file_index: usize,
        file_count: usize,
        config: TrackerConfig,
    ) -> Self {
        let download = SpeedCalculator::new(config.speed_window, config.sample_cap);
        let upload = SpeedCalculator::new(config.speed_window, config.sample_cap);
        Self {
            inner: Arc::new(TrackerInner {
                sink,
                config,
                name: name.into(),
                total_bytes: AtomicU64::new(total_bytes),
                file_index,
                file_count,
                started_at: Instant::now(),
                counters: RwLock::new(Counters::default()),
                download,
                upload,
            }),
            task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn add_downloaded(&self, n: u64) {
        self.inner.add_downloaded(n);
    }

    pub fn add_uploaded(&self, n: u64) {
        self.inner.add_uploaded(n);
    }

    /// Callback form of [`add_downloaded`](Self::add_downloaded), for the relay.
    pub fn download_observer(&self) -> ByteCallback {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |n| inner.add_downloaded(n))
    }

    /// Callback form of [`add_uploaded`](Self::add_uploaded), for the uploader.
    pub fn upload_observer(&self) -> ByteCallback {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |n| inner.add_uploaded(n))
    }

    /// Updates the expected size once the source has been opened.
    pub fn set_total_bytes(&self, total: u64) {
        self.inner.total_bytes.store(total, Ordering::SeqCst);
    }

    /// Pins the displayed phase until the next [`reset`](Self::reset).
    pub fn set_phase(&self, phase: Phase) {
        self.inner.counters.write().pinned_phase = Some(phase);
    }

    /// Clears counters, samples and any pinned phase.
    pub fn reset(&self) {
        let mut c = self.inner.counters.write();
        *c = Counters::default();
        self.inner.download.reset();
        self.inner.upload.reset();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.snapshot()
    }

    /// Spawns the periodic renderer. Has no effect once stopped or already running.
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let period = inner.config.interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let text = render_status(&inner.snapshot());
                inner.render(text).await;
            }
        }));
    }

    /// Cancels the periodic renderer and optionally renders `final_text` once.
    ///
    /// Only the first call has any effect.
    pub async fn stop(&self, final_text: Option<String>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(text) = final_text {
            self.inner.render(text).await;
        }
    }

    /// Renders the current state immediately.
    pub async fn render_now(&self) {
        let text = render_status(&self.inner.snapshot());
        self.inner.render(text).await;
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl TrackerInner {
    async fn render(&self, text: String) {
        match tokio::time::timeout(self.config.render_timeout, self.sink.render(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "status render failed"),
            Err(_) => debug!(timeout = ?self.config.render_timeout, "status render timed out"),
        }
    }

    fn add_downloaded(&self, n: u64) {
        let mut c = self.counters.write();
        c.downloaded += n;
        self.download.add_sample(c.downloaded);
    }

    fn add_uploaded(&self, n: u64) {
        let mut c = self.counters.write();
        c.uploaded += n;
        self.upload.add_sample(c.uploaded);
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let c = self.counters.read();
        let total_bytes = self.total_bytes.load(Ordering::SeqCst);
        let download_speed = self.download.bytes_per_second();
        let upload_speed = self.upload.bytes_per_second();
        let phase = c.pinned_phase.unwrap_or_else(|| {
            if total_bytes > 0 && c.uploaded >= total_bytes {
                Phase::Done
            } else if c.uploaded > 0 {
                Phase::Uploading
            } else if c.downloaded > 0 {
                Phase::Downloading
            } else {
                Phase::Connecting
            }
        });
        ProgressSnapshot {
            name: self.name.clone(),
            file_index: self.file_index,
            file_count: self.file_count,
            total_bytes,
            downloaded: c.downloaded,
            uploaded: c.uploaded,
            download_speed,
            upload_speed,
            download_eta: eta(total_bytes.saturating_sub(c.downloaded), download_speed),
            upload_eta: eta(total_bytes.saturating_sub(c.uploaded), upload_speed),
            phase,
            elapsed: self.started_at.elapsed(),
        }
    }
}

fn eta(remaining: u64, speed: f64) -> Option<Duration> {
    if speed <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(remaining as f64 / speed).ok()
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    at: Instant,
    cumulative: u64,
}

/// Rolling throughput over a trailing window of cumulative byte samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: VecDeque<SpeedSample>,
    cap: usize,
    window: Duration,
}

impl SpeedCalculator {
    pub fn new(window: Duration, cap: usize) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: VecDeque::with_capacity(cap.max(2)),
                cap: cap.max(2),
                window,
            }),
        }
    }

    /// Records the cumulative byte count at the current instant.
    pub fn add_sample(&self, cumulative: u64) {
        let mut s = self.inner.lock();
        s.samples.push_back(SpeedSample {
            at: Instant::now(),
            cumulative,
        });
        while s.samples.len() > s.cap {
            s.samples.pop_front();
        }
    }

    /// Bytes/second between the oldest sample inside the window and the newest.
    ///
    /// Returns 0.0 with fewer than 2 samples or no elapsed time.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock();
        if s.samples.len() < 2 {
            return 0.0;
        }
        let Some(newest) = s.samples.back().copied() else {
            return 0.0;
        };
        let cutoff = newest.at.checked_sub(s.window);
        let Some(oldest) = s
            .samples
            .iter()
            .find(|sample| cutoff.is_none_or(|c| sample.at >= c))
            .copied()
        else {
            return 0.0;
        };

        let elapsed = newest.at.duration_since(oldest.at);
        if elapsed.is_zero() {
            return 0.0;
        }
        newest.cumulative.saturating_sub(oldest.cumulative) as f64 / elapsed.as_secs_f64()
    }

    /// Time to move `remaining` bytes at the current speed, `None` when stalled.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        eta(remaining, self.bytes_per_second())
    }

    pub fn reset(&self) {
        self.inner.lock().samples.clear();
    }

    pub fn sample_count(&self) -> usize {
        self.inner.lock().samples.len()
    }
}
