use std::time::Duration;

use futures_util::StreamExt;
use mediarelay_transfer::{ChunkStream, Source, SourceError};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use tracing::{debug, info};

use crate::chunking::coalesce;

/// Client settings for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub connect_timeout: Duration,
    /// Maximum silence between two body reads.
    pub read_timeout: Duration,
    /// Minimum size of a relayed chunk.
    pub coalesce_target: usize,
    pub headers: Vec<(String, String)>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
            coalesce_target: 512 * 1024,
            headers: Vec::new(),
        }
    }
}

/// Streams the body of a CDN URL.
///
/// The request is issued by [`open`](Self::open) so the declared size is
/// known before relaying starts; [`produce`](Source::produce) streams the
/// already-open response.
pub struct HttpSource {
    name: String,
    declared_size: u64,
    response: Response,
    coalesce_target: usize,
}

impl HttpSource {
    pub async fn open(url: &str, name: Option<String>, config: &HttpSourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (k, v) in &config.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| SourceError::Http(format!("bad header name {k}: {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| SourceError::Http(format!("bad header value for {k}: {e}")))?;
            headers.insert(name, value);
        }

        let response = client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let declared_size = response.content_length().ok_or(SourceError::UnknownSize)?;

        let name = name
            .or_else(|| disposition_filename(&response))
            .unwrap_or_else(|| name_from_url(response.url()));

        info!(url, name = %name, size = declared_size, "http source opened");
        Ok(Self {
            name,
            declared_size,
            response,
            coalesce_target: config.coalesce_target,
        })
    }
}

impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_size(&self) -> u64 {
        self.declared_size
    }

    fn produce(self: Box<Self>) -> ChunkStream {
        let Self {
            name,
            response,
            coalesce_target,
            ..
        } = *self;
        let body = response
            .bytes_stream()
            .map(move |item| {
                item.map_err(|e| {
                    debug!(name = %name, error = %e, "http body read failed");
                    SourceError::Http(e.to_string())
                })
            })
            .boxed();
        coalesce(body, coalesce_target)
    }
}

fn disposition_filename(response: &Response) -> Option<String> {
    let value = response.headers().get(CONTENT_DISPOSITION)?.to_str().ok()?;
    value.split(';').find_map(|part| {
        let part = part.trim();
        let raw = part.strip_prefix("filename=")?;
        let name = raw.trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn name_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "download".to_string())
}
