//! Metadata collaborator boundary.
//!
//! The pipeline treats metadata extraction as an opaque, possibly-slow,
//! possibly-failing call behind the [`MetadataExtractor`] trait. The
//! built-in [`ImageProbe`] fills pixel dimensions and the capture-date
//! fallback; a richer engine (EXIF, HEIC decoding) plugs in through the
//! same trait.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::MetadataError;

/// Technical metadata extracted for one file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Capture timestamp; falls back to the file's modified time when the
    /// source carries no capture date.
    pub date_taken: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub iso: Option<u32>,
    pub exposure_time: Option<String>,
    pub f_number: Option<f64>,
}

pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedMetadata, MetadataError>;
}

/// Default extractor: header-only dimension probe plus the modified-time
/// fallback for `date_taken`. Never decodes pixel data.
pub struct ImageProbe;

impl MetadataExtractor for ImageProbe {
    fn extract(&self, path: &Path) -> Result<ExtractedMetadata, MetadataError> {
        let (width, height) = match image::image_dimensions(path) {
            Ok(dims) => (Some(dims.0), Some(dims.1)),
            Err(image::ImageError::IoError(e)) => {
                return Err(MetadataError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            // Undecodable or unsupported format: keep the entry, just
            // without dimensions.
            Err(e) => {
                log::debug!("Could not probe dimensions of {}: {}", path.display(), e);
                (None, None)
            }
        };

        let date_taken = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .ok();

        Ok(ExtractedMetadata {
            width,
            height,
            date_taken,
            ..Default::default()
        })
    }
}
