//! End-to-end relay: source → relay → upload → finalize → delivery.

use std::sync::Arc;
use std::time::Duration;

use mediarelay_delivery::{DeliveryCoordinator, DeliveryItem};
use mediarelay_protocol::{
    ArtifactFinalizer, DeliveryTransport, MediaKind, StatusSink, UploadTransport, UploadedArtifact,
};
use mediarelay_transfer::{
    ChunkedUploader, Phase, ProgressTracker, StreamRelay, human_bytes, with_retry,
};
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionControl;
use crate::config::RelayConfig;
use crate::error::PipelineError;
use crate::types::{FileJob, RelayOutcome, SkippedFile, TransferRequest};

/// Text rendered once every file is uploaded, before delivery starts.
pub const SENDING_TEXT: &str = "Sending to you…";

/// Runs relay requests against one set of remote endpoints.
pub struct RelayPipeline {
    upload: Arc<dyn UploadTransport>,
    finalizer: Arc<dyn ArtifactFinalizer>,
    delivery: Arc<dyn DeliveryTransport>,
    status: Arc<dyn StatusSink>,
    config: RelayConfig,
    admission: AdmissionControl,
}

impl RelayPipeline {
    pub fn new(
        upload: Arc<dyn UploadTransport>,
        finalizer: Arc<dyn ArtifactFinalizer>,
        delivery: Arc<dyn DeliveryTransport>,
        status: Arc<dyn StatusSink>,
        config: RelayConfig,
    ) -> Self {
        Self {
            upload,
            finalizer,
            delivery,
            status,
            config,
            admission: AdmissionControl::new(),
        }
    }

    /// Shares admission state with other pipelines.
    pub fn with_admission(mut self, admission: AdmissionControl) -> Self {
        self.admission = admission;
        self
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relays every file of `request` and delivers the results.
    ///
    /// Files that keep failing are skipped and listed in the outcome; the
    /// run only fails as a whole when nothing could be uploaded.
    pub async fn run(&self, request: TransferRequest) -> Result<RelayOutcome, PipelineError> {
        let _guard = self.admission.try_admit(&request.requester)?;

        if request.files.is_empty() {
            return Err(PipelineError::EmptyRequest);
        }

        let oversized: Vec<String> = request
            .files
            .iter()
            .filter(|job| {
                job.provider
                    .declared_size()
                    .is_some_and(|size| size > self.config.max_file_size)
            })
            .map(|job| job.name().to_string())
            .collect();
        if !oversized.is_empty() {
            warn!(requester = %request.requester, files = ?oversized, "oversized files rejected");
            return Err(PipelineError::Oversized { files: oversized });
        }

        info!(
            requester = %request.requester,
            recipient = %request.recipient,
            files = request.files.len(),
            "relay started"
        );

        let count = request.files.len();
        let mut uploaded = Vec::new();
        let mut items = Vec::new();
        let mut skipped = Vec::new();

        for (i, job) in request.files.iter().enumerate() {
            match self.relay_file(job, i + 1, count).await {
                Ok((artifact, item)) => {
                    uploaded.push(artifact);
                    items.push(item);
                }
                Err(e) => {
                    error!(name = %job.name(), error = %e, "file skipped");
                    skipped.push(SkippedFile {
                        name: job.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if items.is_empty() {
            self.render(format!("Nothing could be uploaded ({} skipped)", skipped.len()))
                .await;
            return Err(PipelineError::NothingUploaded {
                skipped: skipped.len(),
            });
        }

        self.render(SENDING_TEXT.to_string()).await;
        let coordinator =
            DeliveryCoordinator::new(Arc::clone(&self.delivery), self.config.delivery_config());
        let report = coordinator.deliver(&request.recipient, &items).await;

        let mut summary = report.summary();
        if !skipped.is_empty() {
            let names: Vec<&str> = skipped.iter().map(|s| s.name.as_str()).collect();
            summary.push_str(&format!(", skipped: {}", names.join(", ")));
        }
        self.render(summary).await;

        info!(
            requester = %request.requester,
            delivered = report.delivered,
            total = report.total,
            skipped = skipped.len(),
            "relay finished"
        );
        Ok(RelayOutcome {
            report,
            uploaded,
            skipped,
        })
    }

    /// Uploads and finalizes one file, retrying with a fresh source.
    async fn relay_file(
        &self,
        job: &FileJob,
        index: usize,
        count: usize,
    ) -> Result<(UploadedArtifact, DeliveryItem), PipelineError> {
        let tracker = ProgressTracker::new(
            Arc::clone(&self.status),
            job.name(),
            job.provider.declared_size().unwrap_or(0),
            index,
            count,
            self.config.tracker_config(),
        );
        tracker.start();

        let attempts = self.config.file_attempts.max(1);
        let mut attempt = 1;
        let result = loop {
            match self.attempt_file(job, &tracker).await {
                Ok(done) => break Ok(done),
                Err(e @ PipelineError::Oversized { .. }) => break Err(e),
                Err(e) if attempt >= attempts => break Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!(
                        name = %job.name(),
                        attempt,
                        error = %e,
                        "file failed, retrying with a fresh source"
                    );
                    tracker.set_phase(Phase::Retrying { attempt });
                    tracker.render_now().await;
                    tokio::time::sleep(self.config.file_retry_pause()).await;
                    tracker.reset();
                }
            }
        };

        match &result {
            Ok(_) => {
                tracker.set_phase(Phase::Done);
                tracker.stop(None).await;
            }
            Err(e) => {
                tracker
                    .stop(Some(format!("Failed: {} ({e})", job.name())))
                    .await;
            }
        }
        result
    }

    async fn attempt_file(
        &self,
        job: &FileJob,
        tracker: &ProgressTracker,
    ) -> Result<(UploadedArtifact, DeliveryItem), PipelineError> {
        let source = job.provider.open().await?;
        let size = source.declared_size();
        if size > self.config.max_file_size {
            return Err(PipelineError::Oversized {
                files: vec![source.name().to_string()],
            });
        }
        tracker.set_total_bytes(size);
        debug!(name = %source.name(), size = %human_bytes(size as f64), "source opened");

        let capacity = job.relay_capacity.unwrap_or(self.config.relay_capacity);
        let mut relay =
            StreamRelay::new(source, capacity).with_download_observer(tracker.download_observer());
        let uploader =
            ChunkedUploader::new(Arc::clone(&self.upload), self.config.uploader_config())
                .with_upload_observer(tracker.upload_observer());
        let artifact = uploader.upload(&mut relay).await?;

        tracker.set_phase(Phase::Finalizing);
        let kind = MediaKind::classify(&artifact.name);
        let finalizer = self.finalizer.as_ref();
        let media = match with_retry(&self.config.retry_policy(), "finalize", || {
            finalizer.finalize(&artifact, kind)
        })
        .await
        {
            Ok(media) => media,
            Err(e) => {
                if let Err(cleanup) = self.upload.discard(artifact.session_id).await {
                    warn!(session_id = artifact.session_id, error = %cleanup, "discarding parts failed");
                }
                return Err(e.into());
            }
        };
        debug!(name = %artifact.name, %kind, %media, "artifact finalized");

        let item = DeliveryItem {
            media,
            kind,
            name: artifact.name.clone(),
            size: artifact.size,
        };
        Ok((artifact, item))
    }

    async fn render(&self, text: String) {
        let limit = Duration::from_secs(self.config.call_timeout_secs);
        match tokio::time::timeout(limit, self.status.render(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "status render failed"),
            Err(_) => warn!(timeout = ?limit, "status render timed out"),
        }
    }
}
