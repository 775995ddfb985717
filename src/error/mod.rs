//! # Error Module
//!
//! Error types for the catalog, scanner, resolver and relocator.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - every message names the path involved
//! - **Soft misses are not errors** - a file that is not an image, a missing
//!   capture date or a vanished file are logged, never returned

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Duplicate search error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Move error: {0}")]
    Relocate(#[from] RelocateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by the metadata catalog and its log file
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog {path} is corrupted at line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Refusing to write catalog data into the catalog file itself: {path}")]
    SelfWrite { path: PathBuf },

    #[error("Failed to serialize record for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Catalog lock for {path} was poisoned by a panicked writer")]
    LockPoisoned { path: PathBuf },

    #[error("Failed to refresh changed file {path}: {source}")]
    Refresh {
        path: PathBuf,
        #[source]
        source: FingerprintError,
    },
}

/// Errors that occur while fingerprinting a single file
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

/// Errors that stop a directory scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Cannot resolve path {path}: {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("A scan worker thread panicked")]
    WorkerPanicked,

    #[error("Scan work queue closed before all files were queued")]
    QueueClosed,
}

/// Errors that occur while searching for duplicates
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot resolve scope directory {path}: {source}")]
    InvalidScope {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors that occur while moving duplicates
#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("Destination file already exists: {destination} (moving {source_path})")]
    DestinationExists {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("{path} is not inside the prefix to strip {prefix}")]
    OutsideStripPrefix { path: PathBuf, prefix: PathBuf },

    #[error("Cannot resolve path {path}: {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_catalog_error_names_line() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = CatalogError::Corrupt {
            path: PathBuf::from("/var/catalog.jsonl"),
            line: 7,
            source,
        };
        let message = error.to_string();
        assert!(message.contains("/var/catalog.jsonl"));
        assert!(message.contains("line 7"));
    }

    #[test]
    fn destination_conflict_names_both_paths() {
        let error = RelocateError::DestinationExists {
            source_path: PathBuf::from("/photos/a.jpg"),
            destination: PathBuf::from("/quarantine/photos/a.jpg"),
        };
        let message = error.to_string();
        assert!(message.contains("/photos/a.jpg"));
        assert!(message.contains("/quarantine/photos/a.jpg"));
    }

    #[test]
    fn scan_error_wraps_fingerprint_error() {
        let error: DedupError = ScanError::from(FingerprintError::Io {
            path: PathBuf::from("/photos/locked.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
        .into();
        assert!(error.to_string().contains("/photos/locked.jpg"));
    }
}
