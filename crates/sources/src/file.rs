use std::path::{Path, PathBuf};

use bytes::BytesMut;
use mediarelay_transfer::{ChunkStream, Source, SourceError};
use tokio::io::AsyncReadExt;

/// Read size for local files (1 MiB).
pub const FILE_READ_SIZE: usize = 1024 * 1024;

/// Relay capacity suited to 1 MiB file chunks.
pub const FILE_RELAY_CAPACITY: usize = 4;

/// Local file source, e.g. a member extracted from an archive.
pub struct FileSource {
    path: PathBuf,
    name: String,
    declared_size: u64,
    read_size: usize,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(SourceError::Other(format!("not a file: {}", path.display())));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self {
            path,
            name,
            declared_size: meta.len(),
            read_size: FILE_READ_SIZE,
        })
    }

    /// Overrides the display name (defaults to the file name).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> u64 {
        self.declared_size
    }

    fn produce(self: Box<Self>) -> ChunkStream {
        let read_size = self.read_size;
        let state: Option<(PathBuf, Option<tokio::fs::File>)> = Some((self.path, None));

        Box::pin(futures_util::stream::unfold(state, move |state| async move {
            let (path, file) = state?;
            let mut file = match file {
                Some(f) => f,
                None => match tokio::fs::File::open(&path).await {
                    Ok(f) => f,
                    Err(e) => return Some((Err(SourceError::Io(e)), None)),
                },
            };

            let mut buf = BytesMut::with_capacity(read_size);
            while buf.len() < read_size {
                match file.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => return Some((Err(SourceError::Io(e)), None)),
                }
            }
            if buf.is_empty() {
                return None;
            }
            Some((Ok(buf.freeze()), Some((path, Some(file)))))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_file_in_fixed_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("member.bin");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let src = FileSource::open(&path).await.unwrap().with_read_size(1000);
        assert_eq!(src.name(), "member.bin");
        assert_eq!(src.declared_size(), 2500);

        let chunks: Vec<_> = Box::new(src).produce().map(|c| c.unwrap()).collect().await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let err = FileSource::open(dir.path().join("nope.bin")).await;
        assert!(matches!(err, Err(SourceError::Io(_))));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(FileSource::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn rename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.tmp");
        std::fs::write(&path, b"x").unwrap();
        let src = FileSource::open(&path).await.unwrap().with_name("photo.jpg");
        assert_eq!(src.name(), "photo.jpg");
    }
}
