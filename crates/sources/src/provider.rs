//! [`SourceProvider`] implementations for each adapter.
//!
//! A provider remembers how to reach its origin so a failed transfer can be
//! retried against a freshly opened source.

use std::path::PathBuf;
use std::sync::Arc;

use mediarelay_protocol::RemoteFuture;
use mediarelay_transfer::{OpenFuture, RetryPolicy, Source, SourceError, SourceProvider, with_retry};
use tracing::debug;

use crate::attachment::{ATTACHMENT_REQUEST_SIZE, AttachmentSource, RangeFetcher};
use crate::file::{FILE_READ_SIZE, FileSource};
use crate::http::{HttpSource, HttpSourceConfig};

/// Produces the URL to download from, e.g. by re-requesting a signed CDN link.
pub trait LinkResolver: Send + Sync {
    fn resolve(&self) -> RemoteFuture<'_, String>;
}

/// A URL that never expires.
pub struct StaticLink(pub String);

impl LinkResolver for StaticLink {
    fn resolve(&self) -> RemoteFuture<'_, String> {
        let url = self.0.clone();
        Box::pin(async move { Ok(url) })
    }
}

/// Opens an [`HttpSource`], resolving the link again on every open.
pub struct HttpProvider {
    resolver: Arc<dyn LinkResolver>,
    name: String,
    explicit_name: bool,
    config: HttpSourceConfig,
    retry: RetryPolicy,
}

impl HttpProvider {
    /// Provider for a fixed URL. The display name defaults to the last path segment.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "download".to_string());
        Self {
            resolver: Arc::new(StaticLink(url)),
            name,
            explicit_name: false,
            config: HttpSourceConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Provider whose URL is produced by `resolver` before each open.
    pub fn with_resolver(resolver: Arc<dyn LinkResolver>, name: impl Into<String>) -> Self {
        Self {
            resolver,
            name: name.into(),
            explicit_name: true,
            config: HttpSourceConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Forces the display name instead of the server-suggested one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.explicit_name = true;
        self
    }

    pub fn with_config(mut self, config: HttpSourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl SourceProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> Option<u64> {
        None
    }

    fn open(&self) -> OpenFuture<'_> {
        Box::pin(async move {
            let resolver = self.resolver.as_ref();
            let url = with_retry(&self.retry, "link resolve", || resolver.resolve()).await?;
            debug!(name = %self.name, "opening http source");
            let name = self.explicit_name.then(|| self.name.clone());
            let source = HttpSource::open(&url, name, &self.config).await?;
            Ok::<_, SourceError>(Box::new(source) as Box<dyn Source>)
        })
    }
}

/// Reopens a local file on every attempt.
pub struct FileProvider {
    path: PathBuf,
    name: String,
    read_size: usize,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            path,
            name,
            read_size: FILE_READ_SIZE,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }
}

impl SourceProvider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn open(&self) -> OpenFuture<'_> {
        Box::pin(async move {
            let source = FileSource::open(&self.path)
                .await?
                .with_name(self.name.clone())
                .with_read_size(self.read_size);
            Ok::<_, SourceError>(Box::new(source) as Box<dyn Source>)
        })
    }
}

/// Chat attachment whose size is known from the message metadata.
pub struct AttachmentProvider {
    fetcher: Arc<dyn RangeFetcher>,
    name: String,
    size: u64,
    request_size: usize,
    retry: RetryPolicy,
}

impl AttachmentProvider {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, name: impl Into<String>, size: u64) -> Self {
        Self {
            fetcher,
            name: name.into(),
            size,
            request_size: ATTACHMENT_REQUEST_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_request_size(mut self, request_size: usize) -> Self {
        self.request_size = request_size;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl SourceProvider for AttachmentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn open(&self) -> OpenFuture<'_> {
        let source = AttachmentSource::new(Arc::clone(&self.fetcher), self.name.clone(), self.size)
            .with_request_size(self.request_size)
            .with_retry_policy(self.retry.clone());
        Box::pin(async move { Ok::<_, SourceError>(Box::new(source) as Box<dyn Source>) })
    }
}
