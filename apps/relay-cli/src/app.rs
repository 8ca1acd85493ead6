//! Application wiring: local outbox backend around the relay pipeline.
//!
//! Parts are stored by a [`LocalPartStore`], finalized artifacts are
//! assembled under `<outbox>/files`, and every delivery is appended to
//! `<outbox>/deliveries.jsonl`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use mediarelay_pipeline::{FileJob, RelayPipeline, TransferRequest};
use mediarelay_protocol::{
    ArtifactFinalizer, DeliveryAck, DeliveryTransport, MediaKind, MediaRef, RecipientId,
    RemoteError, RemoteFuture, StatusSink, UploadedArtifact,
};
use mediarelay_sources::{FILE_RELAY_CAPACITY, FileProvider, HttpProvider};
use mediarelay_transfer::{LocalPartStore, TransferError};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::config::Config;

/// Relays `inputs` (local paths or http(s) URLs) into the configured outbox.
pub async fn run(config: Config, inputs: Vec<String>) -> anyhow::Result<()> {
    let outbox = config.outbox_dir.clone();
    tokio::fs::create_dir_all(&outbox).await?;

    let store = Arc::new(LocalPartStore::new(outbox.join(".parts")));
    let finalizer = Arc::new(OutboxFinalizer {
        store: Arc::clone(&store),
        files_dir: outbox.join("files"),
    });
    let delivery = Arc::new(ManifestDelivery::new(outbox.join("deliveries.jsonl")));

    let pipeline = RelayPipeline::new(
        store,
        finalizer,
        delivery,
        Arc::new(LogStatus),
        config.relay.clone(),
    );

    let files = inputs.iter().map(|input| file_job(input)).collect();
    let request = TransferRequest {
        requester: "cli".into(),
        recipient: RecipientId::new(config.recipient.clone()),
        files,
    };

    let outcome = pipeline.run(request).await?;
    for skipped in &outcome.skipped {
        tracing::warn!(name = %skipped.name, reason = %skipped.reason, "file skipped");
    }
    tracing::info!(
        outbox = %outbox.display(),
        delivered = outcome.report.delivered,
        total = outcome.report.total,
        "relay complete"
    );

    if !outcome.is_complete() {
        anyhow::bail!(
            "{} of {} files delivered, {} skipped",
            outcome.report.delivered,
            outcome.report.total + outcome.skipped.len(),
            outcome.skipped.len()
        );
    }
    Ok(())
}

fn file_job(input: &str) -> FileJob {
    if input.starts_with("http://") || input.starts_with("https://") {
        FileJob::new(HttpProvider::new(input))
    } else {
        FileJob::new(FileProvider::new(input)).with_relay_capacity(FILE_RELAY_CAPACITY)
    }
}

/// Assembles committed parts into the outbox and drops the part files.
struct OutboxFinalizer {
    store: Arc<LocalPartStore>,
    files_dir: PathBuf,
}

impl ArtifactFinalizer for OutboxFinalizer {
    fn finalize<'a>(
        &'a self,
        artifact: &'a UploadedArtifact,
        kind: MediaKind,
    ) -> RemoteFuture<'a, MediaRef> {
        Box::pin(async move {
            let path = self
                .store
                .assemble(artifact, &self.files_dir)
                .await
                .map_err(finalize_error)?;
            if let Err(e) = self.store.remove_session(artifact.session_id).await {
                tracing::warn!(session_id = artifact.session_id, error = %e, "part cleanup failed");
            }
            tracing::debug!(path = %path.display(), %kind, "artifact assembled");
            Ok::<_, RemoteError>(MediaRef::new(path.to_string_lossy()))
        })
    }
}

fn finalize_error(e: TransferError) -> RemoteError {
    match e {
        TransferError::InvalidName(_) => RemoteError::Permanent(e.to_string()),
        other => RemoteError::Transport(other.to_string()),
    }
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    message_id: i64,
    recipient: &'a str,
    media: &'a str,
    /// Shared by every entry of one group send.
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<i64>,
}

/// Records deliveries as JSON lines.
struct ManifestDelivery {
    path: PathBuf,
    next_id: AtomicI64,
}

impl ManifestDelivery {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            next_id: AtomicI64::new(1),
        }
    }

    async fn append(
        &self,
        recipient: &RecipientId,
        refs: &[MediaRef],
        grouped: bool,
    ) -> Result<Vec<DeliveryAck>, RemoteError> {
        let mut lines = String::new();
        let mut acks = Vec::with_capacity(refs.len());
        let first = self.next_id.fetch_add(refs.len() as i64, Ordering::SeqCst);
        let recipient = recipient.to_string();
        for (i, media) in refs.iter().enumerate() {
            let message_id = first + i as i64;
            let entry = ManifestEntry {
                message_id,
                recipient: &recipient,
                media: media.as_str(),
                group: grouped.then_some(first),
            };
            let line =
                serde_json::to_string(&entry).map_err(|e| RemoteError::Permanent(e.to_string()))?;
            lines.push_str(&line);
            lines.push('\n');
            acks.push(DeliveryAck::new(message_id));
        }
        append_to(&self.path, lines.as_bytes())
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(acks)
    }
}

async fn append_to(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

impl DeliveryTransport for ManifestDelivery {
    fn group_send<'a>(
        &'a self,
        recipient: &'a RecipientId,
        refs: &'a [MediaRef],
    ) -> RemoteFuture<'a, Vec<DeliveryAck>> {
        Box::pin(self.append(recipient, refs, true))
    }

    fn single_send<'a>(
        &'a self,
        recipient: &'a RecipientId,
        media: &'a MediaRef,
    ) -> RemoteFuture<'a, DeliveryAck> {
        Box::pin(async move {
            let acks = self.append(recipient, std::slice::from_ref(media), false).await?;
            acks.into_iter()
                .next()
                .ok_or_else(|| RemoteError::Rejected("no acknowledgement".into()))
        })
    }
}

/// Writes status renders to the log.
struct LogStatus;

impl StatusSink for LogStatus {
    fn render(&self, text: String) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(target: "mediarelay::status", "\n{text}");
            Ok(())
        })
    }
}
