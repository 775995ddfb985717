//! Bitmap hashing: digest of the decoded pixels, independent of file encoding.

use super::BitmapHasher;
use crate::error::FingerprintError;
use image::ImageReader;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Decodes any still image the `image` crate recognises and hashes a
/// canonical encoding of it: width and height as little-endian `u32`, then the
/// RGBA8 pixel rows.
///
/// The same picture saved as PNG and as BMP hashes identically even though
/// the files differ byte for byte.
pub struct CanonicalBitmapHasher;

impl BitmapHasher for CanonicalBitmapHasher {
    fn hash_bitmap(&self, path: &Path) -> Result<Option<String>, FingerprintError> {
        let io_error = |source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Format is sniffed from the leading bytes, not the extension
        let file = File::open(path).map_err(io_error)?;
        let reader = ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(io_error)?;

        if reader.format().is_none() {
            return Ok(None);
        }

        tracing::trace!("Reading image {}", path.display());
        let image = reader.decode().map_err(|e| FingerprintError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let pixels = image.to_rgba8();
        let mut hasher = Sha256::new();
        hasher.update(pixels.width().to_le_bytes());
        hasher.update(pixels.height().to_le_bytes());
        hasher.update(pixels.as_raw());

        Ok(Some(format!("{:x}", hasher.finalize())))
    }
}
