//! Whole-file SHA-256 hashing.

use super::ContentHasher;
use crate::error::FingerprintError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Read buffer for streaming large files through the hasher
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Streams the file through SHA-256 and returns the lowercase hex digest.
pub struct Sha256ContentHasher;

impl ContentHasher for Sha256ContentHasher {
    fn hash_file(&self, path: &Path) -> Result<String, FingerprintError> {
        let io_error = |source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_error)?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut hasher = Sha256::new();

        tracing::trace!("Hashing file {}", path.display());
        io::copy(&mut reader, &mut hasher).map_err(io_error)?;

        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Hex SHA-256 of an in-memory buffer
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
