use std::path::{Path, PathBuf};

use bytes::Bytes;
use mediarelay_protocol::{RemoteError, RemoteFuture, UploadTransport, UploadedArtifact};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::TransferError;
use crate::validation::validate_artifact_name;

/// Filesystem-backed [`UploadTransport`].
///
/// Each part lands in `<root>/<session_id>/<index>.part`; [`assemble`](Self::assemble)
/// concatenates them back into a named file.
#[derive(Debug, Clone)]
pub struct LocalPartStore {
    root: PathBuf,
}

impl LocalPartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: i64) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    pub fn part_path(&self, session_id: i64, index: u32) -> PathBuf {
        self.session_dir(session_id).join(format!("{index}.part"))
    }

    async fn write_part(&self, session_id: i64, index: u32, bytes: Bytes) -> Result<(), RemoteError> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        tokio::fs::write(self.part_path(session_id, index), &bytes)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        debug!(session_id, part = index, len = bytes.len(), "part stored");
        Ok(())
    }

    /// Reassembles the committed parts of `artifact` into `dest_dir/<name>`.
    ///
    /// An existing file is never replaced: the name gets a `-1`, `-2`, ...
    /// suffix before its extension until it is free.
    pub async fn assemble(
        &self,
        artifact: &UploadedArtifact,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        validate_artifact_name(&artifact.name)?;
        let (target, mut out) = create_unique(dest_dir, &artifact.name).await?;
        if let Err(e) = self.concat_parts(artifact, &mut out).await {
            drop(out);
            let _ = tokio::fs::remove_file(&target).await;
            return Err(e);
        }
        Ok(target)
    }

    async fn concat_parts(
        &self,
        artifact: &UploadedArtifact,
        out: &mut tokio::fs::File,
    ) -> Result<(), TransferError> {
        for index in 0..artifact.committed_part_count {
            let data = tokio::fs::read(self.part_path(artifact.session_id, index)).await?;
            out.write_all(&data).await?;
        }
        out.flush().await?;
        Ok(())
    }

    /// Deletes every stored part of a session.
    pub async fn remove_session(&self, session_id: i64) -> Result<(), TransferError> {
        match tokio::fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn create_unique(
    dest_dir: &Path,
    name: &str,
) -> Result<(PathBuf, tokio::fs::File), TransferError> {
    let original = dest_dir.join(name);
    if let Some(parent) = original.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = original.extension().map(|e| e.to_string_lossy().into_owned());

    let mut attempt = 0u32;
    loop {
        let target = match (attempt, &extension) {
            (0, _) => original.clone(),
            (n, Some(ext)) => original.with_file_name(format!("{stem}-{n}.{ext}")),
            (n, None) => original.with_file_name(format!("{stem}-{n}")),
        };
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => return Ok((target, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

impl UploadTransport for LocalPartStore {
    fn commit_part_small(
        &self,
        session_id: i64,
        part_index: u32,
        bytes: Bytes,
    ) -> RemoteFuture<'_, ()> {
        Box::pin(self.write_part(session_id, part_index, bytes))
    }

    fn commit_part_big(
        &self,
        session_id: i64,
        part_index: u32,
        total_parts: u32,
        bytes: Bytes,
    ) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            if part_index >= total_parts {
                return Err(RemoteError::Permanent(format!(
                    "part {part_index} out of range for {total_parts} parts"
                )));
            }
            self.write_part(session_id, part_index, bytes).await
        })
    }

    fn discard(&self, session_id: i64) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.remove_session(session_id)
                .await
                .map_err(|e| RemoteError::Transport(e.to_string()))
        })
    }
}
