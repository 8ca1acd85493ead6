//! [`Source`](mediarelay_transfer::Source) adapters.
//!
//! - [`HttpSource`]: streams a CDN URL, size from `Content-Length`.
//! - [`AttachmentSource`]: offset-fetches a chat attachment through a [`RangeFetcher`].
//! - [`FileSource`]: reads a local file, e.g. an extracted archive member.
//!
//! Each adapter has a matching [`SourceProvider`](mediarelay_transfer::SourceProvider)
//! in [`provider`] so failed transfers can reopen their origin.

pub mod attachment;
pub mod chunking;
pub mod file;
pub mod http;
pub mod provider;

pub use attachment::{ATTACHMENT_REQUEST_SIZE, AttachmentSource, RangeFetcher};
pub use chunking::coalesce;
pub use file::{FILE_READ_SIZE, FILE_RELAY_CAPACITY, FileSource};
pub use http::{HttpSource, HttpSourceConfig};
pub use provider::{AttachmentProvider, FileProvider, HttpProvider, LinkResolver, StaticLink};
