//! # Scanner Module
//!
//! Discovers regular files under the scan roots.
//!
//! Every regular file is a candidate, whatever its extension: the
//! fingerprinter decides what it can read. Directories, symlinks (unless
//! followed) and other special files are skipped, as are the catalog's own
//! files.
//!
//! ## Example
//! ```rust,ignore
//! use media_cleaner::core::scanner::{ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default()).skip_catalog(&log_path);
//! for file in scanner.files(Path::new("/photos"), &null_sender()) {
//!     println!("{} ({} bytes)", file.path.display(), file.metadata.len());
//! }
//! ```

mod walker;

pub use walker::{FileWalk, ScanConfig, WalkDirScanner, WalkedFile};
