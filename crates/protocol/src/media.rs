//! Media classification.
//!
//! Every relayed file maps to exactly one [`MediaKind`], and every kind maps
//! to a static [`KindTraits`] row describing how it is delivered.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_BATCH;

/// Closed set of media kinds, ordered by delivery priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Document,
}

/// Extra attributes a kind asks the finalizer to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAttribute {
    /// Original file name.
    Filename,
    /// Playable while still downloading.
    SupportsStreaming,
}

/// Static delivery traits of a [`MediaKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindTraits {
    /// Whether several items may be sent as one group.
    pub groupable: bool,
    /// Largest batch for this kind.
    pub max_batch: usize,
    /// MIME family used when no specific type is known.
    pub mime_family: &'static str,
    pub attributes: &'static [MediaAttribute],
}

const PHOTO_TRAITS: KindTraits = KindTraits {
    groupable: true,
    max_batch: MAX_BATCH,
    mime_family: "image",
    attributes: &[MediaAttribute::Filename],
};

const VIDEO_TRAITS: KindTraits = KindTraits {
    groupable: true,
    max_batch: MAX_BATCH,
    mime_family: "video",
    attributes: &[MediaAttribute::Filename, MediaAttribute::SupportsStreaming],
};

const AUDIO_TRAITS: KindTraits = KindTraits {
    groupable: false,
    max_batch: 1,
    mime_family: "audio",
    attributes: &[MediaAttribute::Filename],
};

const DOCUMENT_TRAITS: KindTraits = KindTraits {
    groupable: false,
    max_batch: 1,
    mime_family: "application",
    attributes: &[MediaAttribute::Filename],
};

const PHOTO_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const VIDEO_EXTS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "flv", "m4v", "ts"];
const AUDIO_EXTS: &[&str] = &["mp3", "flac", "aac", "ogg", "m4a", "wav", "opus"];
const ARCHIVE_EXTS: &[&str] = &["zip", "rar"];

impl MediaKind {
    /// All kinds in delivery order.
    pub const ALL: [MediaKind; 4] = [Self::Photo, Self::Video, Self::Audio, Self::Document];

    /// Classifies a file name by its extension (case-insensitive).
    pub fn classify(name: &str) -> Self {
        let ext = extension(name);
        let ext = ext.as_deref().unwrap_or("");
        if PHOTO_EXTS.contains(&ext) {
            Self::Photo
        } else if VIDEO_EXTS.contains(&ext) {
            Self::Video
        } else if AUDIO_EXTS.contains(&ext) {
            Self::Audio
        } else {
            Self::Document
        }
    }

    pub fn traits(self) -> &'static KindTraits {
        match self {
            Self::Photo => &PHOTO_TRAITS,
            Self::Video => &VIDEO_TRAITS,
            Self::Audio => &AUDIO_TRAITS,
            Self::Document => &DOCUMENT_TRAITS,
        }
    }

    pub fn is_groupable(self) -> bool {
        self.traits().groupable
    }

    /// Batch size for this kind, capped at `limit`. Never zero.
    pub fn batch_limit(self, limit: usize) -> usize {
        self.traits().max_batch.min(limit).max(1)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        };
        f.write_str(s)
    }
}

/// Returns the MIME type for a file name, falling back to the kind's family.
pub fn mime_for(name: &str) -> String {
    let ext = extension(name);
    let specific = match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4" | "m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("flv") => "video/x-flv",
        Some("ts") => "video/mp2t",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("aac") => "audio/aac",
        Some("ogg" | "opus") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("zip") => "application/zip",
        Some("rar") => "application/vnd.rar",
        Some("pdf") => "application/pdf",
        _ => "",
    };
    if specific.is_empty() {
        match MediaKind::classify(name) {
            MediaKind::Document => "application/octet-stream".to_string(),
            kind => format!("{}/octet-stream", kind.traits().mime_family),
        }
    } else {
        specific.to_string()
    }
}

/// Whether the name looks like a supported archive.
pub fn is_archive(name: &str) -> bool {
    extension(name).is_some_and(|e| ARCHIVE_EXTS.contains(&e.as_str()))
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
