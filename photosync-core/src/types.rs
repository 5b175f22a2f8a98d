use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The set of file extensions (lowercase, no leading dot) the catalog indexes.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "raw", "cr2", "nef", "arw", "dng",
    "orf", "rw2", "pef", "srw",
];

/// Returns true if `path`'s extension (case-insensitive) is in [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A catalog row mirroring one file believed to exist on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub file_path: String,
    pub filename: String,
    pub category: String,
    pub title: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Photo {
    /// Builds a brand-new row for a freshly discovered file. `id` is a random 128-bit token.
    pub fn new(
        file_path: String,
        filename: String,
        category: String,
        title: String,
        metadata: &ImageMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_photo_id(),
            file_path,
            filename,
            category,
            title,
            file_size: metadata.file_size,
            width: metadata.width,
            height: metadata.height,
            file_modified_at: metadata.file_modified_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generates a stable, opaque 128-bit random id in textual form.
pub fn new_photo_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Metadata extracted from a single file by the metadata extractor (C1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetadata {
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_modified_at: DateTime<Utc>,
}

/// The four closed kinds of filesystem change the watcher reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A single filesystem change observed by the watcher (C4), destined for the
/// event pipeline (C5) and ultimately the reconciliation engine (C3).
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub category: String,
    pub observed_at: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: PathBuf, category: String) -> Self {
        Self {
            kind,
            path,
            category,
            observed_at: Utc::now(),
        }
    }
}

/// Aggregate counters returned by one `full_sync()` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub scanned: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub errors: u64,
}
