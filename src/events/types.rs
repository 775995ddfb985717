//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted while loading, scanning, resolving and moving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Catalog load and compaction events
    Catalog(CatalogEvent),
    /// Directory scan events
    Scan(ScanEvent),
    /// Duplicate search events
    Resolve(ResolveEvent),
    /// Duplicate move events
    Relocate(RelocateEvent),
}

/// Events while restoring or compacting the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogEvent {
    /// The log was read
    LogRead { path: PathBuf, entries: usize },
    /// A logged file no longer exists and was forgotten
    Dropped { path: PathBuf },
    /// A logged file changed on disk and was fingerprinted again
    Refreshed { path: PathBuf },
    /// The catalog is ready
    Loaded { records: usize },
    /// The log was rewritten; the previous log was kept as `backup`
    Compacted { backup: PathBuf },
}

/// Events during a directory scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { roots: Vec<PathBuf> },
    /// Progress update, sent as files are walked
    Progress(ScanProgress),
    /// A new or changed file was fingerprinted and committed
    Fingerprinted { path: PathBuf },
    /// An entry could not be read but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed {
        files_seen: usize,
        fingerprinted: usize,
    },
}

/// Progress information during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Regular files walked so far
    pub files_seen: usize,
    /// Files that matched their catalog record
    pub unchanged: usize,
    /// File currently being looked at
    pub current_path: PathBuf,
}

/// Events during the duplicate search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolveEvent {
    /// Search started over this many seed records
    Started { seeds: usize },
    /// A master with confirmed duplicates was found
    GroupFound { master: PathBuf, duplicates: usize },
    /// Search completed
    Completed { groups: usize, findings: usize },
}

/// Events while moving duplicates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelocateEvent {
    /// Dry run: this move would happen
    Planned {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The duplicate was moved and forgotten by the catalog
    Moved {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The duplicate had already disappeared
    MissingSource { path: PathBuf },
    /// The group's master had disappeared; its duplicates were kept
    MissingMaster { master: PathBuf },
    /// All duplicates were handled
    Completed {
        moved: usize,
        planned: usize,
        missing: usize,
    },
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Loading,
    Scanning,
    Resolving,
    Relocating,
    Compacting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Loading => write!(f, "Loading catalog"),
            Phase::Scanning => write!(f, "Scanning"),
            Phase::Resolving => write!(f, "Finding duplicates"),
            Phase::Relocating => write!(f, "Moving duplicates"),
            Phase::Compacting => write!(f, "Compacting catalog"),
        }
    }
}
