//! Directory walking implementation using walkdir.

use crate::events::{Event, EventSender, ScanEvent};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Configuration for the directory walk
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            max_depth: None,
        }
    }
}

/// A regular file found by the walk
#[derive(Debug)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Walks directory trees and yields regular files.
pub struct WalkDirScanner {
    config: ScanConfig,
    skip: Vec<PathBuf>,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            skip: Vec::new(),
        }
    }

    /// Never yield the catalog log at `log_path`, nor its siblings named
    /// `<log>.<suffix>` (compaction scratch file and backups)
    pub fn skip_catalog(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.skip.push(log_path.into());
        self
    }

    /// Lazily walk `root`. Unreadable entries are logged, reported through
    /// `events` and skipped.
    pub fn files<'a>(&'a self, root: &Path, events: &'a EventSender) -> FileWalk<'a> {
        let mut walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let include_hidden = self.config.include_hidden;
        let entries = walker
            .into_iter()
            .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry));

        FileWalk {
            entries: Box::new(entries),
            skip: &self.skip,
            events,
            errors: 0,
        }
    }
}

/// Iterator over the regular files under one root
pub struct FileWalk<'a> {
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
    skip: &'a [PathBuf],
    events: &'a EventSender,
    errors: usize,
}

impl FileWalk<'_> {
    /// Entries that could not be read so far
    pub fn errors(&self) -> usize {
        self.errors
    }

    fn report(&mut self, path: PathBuf, message: String) {
        tracing::warn!("Skipping {}: {}", path.display(), message);
        self.errors += 1;
        self.events
            .send(Event::Scan(ScanEvent::Error { path, message }));
    }
}

impl Iterator for FileWalk<'_> {
    type Item = WalkedFile;

    fn next(&mut self) -> Option<WalkedFile> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    self.report(path, e.to_string());
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if self.skip.iter().any(|log| is_catalog_file(log, entry.path())) {
                tracing::trace!("Not scanning catalog file {}", entry.path().display());
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    return Some(WalkedFile {
                        path: entry.into_path(),
                        metadata,
                    })
                }
                Err(e) => self.report(entry.into_path(), e.to_string()),
            }
        }
    }
}

fn is_catalog_file(log: &Path, path: &Path) -> bool {
    if path == log {
        return true;
    }
    let (Some(dir), Some(name)) = (log.parent(), log.file_name()) else {
        return false;
    };
    let mut prefix = name.to_os_string();
    prefix.push(".");
    path.parent() == Some(dir)
        && path
            .file_name()
            .is_some_and(|file| file.as_encoded_bytes().starts_with(prefix.as_encoded_bytes()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
