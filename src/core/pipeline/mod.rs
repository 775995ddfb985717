//! # Pipeline Module
//!
//! Brings the catalog up to date with the scan roots.
//!
//! ## Stages
//! 1. **Walk** - one producer walks the roots and checks each file against
//!    its catalog record, evicting records of changed files
//! 2. **Fingerprint** - N workers hash new and changed files
//! 3. **Commit** - a single committer appends and indexes each record
//!
//! Stages are connected by bounded crossbeam channels, so a slow disk or a
//! slow log writer throttles the walk instead of buffering the tree in memory.

mod executor;

pub use executor::{PipelineConfig, ScanPipeline, ScanPipelineBuilder, ScanSummary};
