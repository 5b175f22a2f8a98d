//! Metadata Extractor (C1): stats a file and, best-effort, decodes its pixel
//! dimensions. Decode failures are not propagated as errors — an unreadable
//! image is still catalogued with `width`/`height` left null.

use crate::error::Result;
use crate::types::ImageMetadata;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

/// Extracts `(file_size, width?, height?, file_modified_at)` for one file.
///
/// Stat failures (file gone, permission denied) propagate as a typed error.
/// Decode failures (unsupported format, truncated file) are swallowed; the
/// caller still gets a valid `ImageMetadata` with `width`/`height` set to
/// `None`.
pub fn extract(path: &Path) -> Result<ImageMetadata> {
    let stat = std::fs::metadata(path)?;
    let file_size = stat.len();
    let file_modified_at = mtime_utc(&stat)?;

    let (width, height) = match image::image_dimensions(path) {
        Ok((w, h)) => (Some(w), Some(h)),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "could not decode image dimensions");
            (None, None)
        }
    };

    Ok(ImageMetadata {
        file_size,
        width,
        height,
        file_modified_at,
    })
}

fn mtime_utc(stat: &std::fs::Metadata) -> Result<DateTime<Utc>> {
    let modified = stat.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
