//! # Fingerprint Module
//!
//! Turns a file on disk into a `FileRecord`.
//!
//! ## Capabilities
//! Each expensive or platform-specific step sits behind a trait so it can be
//! swapped out (tests inject failing or counting implementations):
//! - `ContentHasher` - whole-file digest, mandatory
//! - `BitmapHasher` - digest of the decoded image, optional
//! - `CaptureDateExtractor` - when the photo or video was taken, optional
//! - `CreationTimeProvider` - file creation time from filesystem metadata
//!
//! Failure of the content hash fails the file. Failures of the optional
//! steps are logged at debug level and leave the field empty.

mod bitmap;
mod capture_date;
mod content;
mod times;

pub use bitmap::CanonicalBitmapHasher;
pub use capture_date::{quicktime_creation_time, MediaDateExtractor};
pub use content::{hash_bytes, Sha256ContentHasher};
pub use times::{to_utc, PlatformCreationTime};

use crate::core::catalog::{FileRecord, FileStat};
use crate::error::FingerprintError;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::Path;

/// Whole-file digest
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> Result<String, FingerprintError>;
}

/// Digest of decoded pixel data.
///
/// `Ok(None)` means the file is not an image we can decode.
pub trait BitmapHasher: Send + Sync {
    fn hash_bitmap(&self, path: &Path) -> Result<Option<String>, FingerprintError>;
}

/// Best-effort capture timestamp from embedded metadata
pub trait CaptureDateExtractor: Send + Sync {
    fn capture_date(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// Creation time of a file, from its metadata
pub trait CreationTimeProvider: Send + Sync {
    fn created(&self, metadata: &Metadata) -> DateTime<Utc>;
}

/// Builds `FileRecord`s from files on disk.
pub struct FingerprintExtractor {
    content: Box<dyn ContentHasher>,
    bitmap: Box<dyn BitmapHasher>,
    capture: Box<dyn CaptureDateExtractor>,
    creation: Box<dyn CreationTimeProvider>,
}

impl FingerprintExtractor {
    /// Extractor with the default SHA-256, image and EXIF/QuickTime backends
    pub fn new() -> Self {
        Self {
            content: Box::new(Sha256ContentHasher),
            bitmap: Box::new(CanonicalBitmapHasher),
            capture: Box::new(MediaDateExtractor),
            creation: Box::new(PlatformCreationTime),
        }
    }

    pub fn with_content_hasher(mut self, hasher: impl ContentHasher + 'static) -> Self {
        self.content = Box::new(hasher);
        self
    }

    pub fn with_bitmap_hasher(mut self, hasher: impl BitmapHasher + 'static) -> Self {
        self.bitmap = Box::new(hasher);
        self
    }

    pub fn with_capture_date_extractor(
        mut self,
        extractor: impl CaptureDateExtractor + 'static,
    ) -> Self {
        self.capture = Box::new(extractor);
        self
    }

    pub fn with_creation_time_provider(
        mut self,
        provider: impl CreationTimeProvider + 'static,
    ) -> Self {
        self.creation = Box::new(provider);
        self
    }

    /// The live facts a record's freshness is judged against
    pub fn stat(&self, metadata: &Metadata) -> FileStat {
        FileStat {
            size: metadata.len(),
            created: self.creation.created(metadata),
            modified: to_utc(metadata.modified()),
        }
    }

    /// Fingerprint `path`.
    ///
    /// `existing` is the record being replaced, if any; it is only used to
    /// warn when the contents changed underneath an unchanged-looking file.
    pub fn extract(
        &self,
        path: &Path,
        metadata: &Metadata,
        existing: Option<&FileRecord>,
    ) -> Result<FileRecord, FingerprintError> {
        tracing::debug!("Processing {}", path.display());

        let content_hash = self.content.hash_file(path)?;

        let bitmap_hash = match self.bitmap.hash_bitmap(path) {
            Ok(Some(digest)) => Some(digest),
            Ok(None) => {
                tracing::debug!("Not an image {}", path.display());
                None
            }
            Err(e) => {
                tracing::debug!("Not a decodable image {}: {}", path.display(), e);
                None
            }
        };

        let capture_date = self.capture.capture_date(path);
        if capture_date.is_none() {
            tracing::debug!("No capture date in {}", path.display());
        }

        let stat = self.stat(metadata);

        if let Some(existing) = existing {
            if existing.content_hash != content_hash
                || existing.bitmap_hash != bitmap_hash
                || existing.capture_date != capture_date
            {
                tracing::warn!("Contents changed for {}", path.display());
            }
        }

        Ok(FileRecord {
            path: path.to_path_buf(),
            size: stat.size,
            content_hash,
            bitmap_hash,
            created: Some(stat.created),
            modified: stat.modified,
            capture_date,
        })
    }
}

impl Default for FingerprintExtractor {
    fn default() -> Self {
        Self::new()
    }
}
