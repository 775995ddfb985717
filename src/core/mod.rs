//! # Core Module
//!
//! The engine behind the CLI.
//!
//! ## Modules
//! - `catalog` - Append-only metadata log and its in-memory index
//! - `fingerprint` - Content digests, bitmap digests and capture dates
//! - `scanner` - Walks directory trees
//! - `pipeline` - Concurrent scan that keeps the catalog fresh
//! - `resolver` - Groups duplicates and picks a master per group
//! - `relocator` - Moves duplicates out of the way

pub mod catalog;
pub mod fingerprint;
pub mod pipeline;
pub mod relocator;
pub mod resolver;
pub mod scanner;

// Re-export commonly used types
pub use catalog::{FileRecord, LoadOptions, LoadStrategy, MetadataStore};
pub use fingerprint::FingerprintExtractor;
pub use pipeline::{ScanPipeline, ScanSummary};
pub use relocator::{MoveStatus, RelocateOutcome, Relocator};
pub use resolver::{DuplicateGroup, DuplicateResolver, Resolution, Scopes};
