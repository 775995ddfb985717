//! `MetadataStore`: the catalog index and its log behind one lock.

use super::{CatalogIndex, CatalogLog, FileRecord, FileStat};
use crate::core::fingerprint::FingerprintExtractor;
use crate::error::{CatalogError, FingerprintError};
use crate::events::{null_sender, CatalogEvent, Event, EventSender};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// How logged records are checked against the filesystem at load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Stat every logged file: drop vanished files, re-fingerprint changed ones
    #[default]
    Repair,
    /// Only drop vanished files; logged fingerprints of the rest are trusted
    /// and a later scan refreshes what changed
    Replay,
}

/// Options for [`MetadataStore::load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Rewrite the log when it holds anything but one current entry per path
    pub compact: bool,
    pub strategy: LoadStrategy,
}

/// What happened while loading the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records restored unchanged
    pub restored: usize,
    /// Records fingerprinted again because the file changed
    pub refreshed: usize,
    /// Records forgotten because the file is gone
    pub dropped: usize,
    /// Older log entries for a path that was logged again later
    pub superseded: usize,
    /// Entries logged with a relative path
    pub repathed: usize,
    /// Backup of the previous log, if the log was compacted
    pub compacted: Option<PathBuf>,
}

impl LoadReport {
    /// Whether the log holds entries a compaction would remove or rewrite
    pub fn has_history(&self) -> bool {
        self.refreshed > 0 || self.dropped > 0 || self.superseded > 0 || self.repathed > 0
    }
}

/// Result of checking a walked file against its catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// The record still describes the file
    Fresh,
    /// The file changed; the old record has been evicted from the index
    Stale(FileRecord),
    /// No record for this path
    Unknown,
}

struct StoreState {
    index: CatalogIndex,
    log: CatalogLog,
}

/// Thread-safe catalog of file records, persisted to an append-only log.
pub struct MetadataStore {
    state: Mutex<StoreState>,
    log_path: PathBuf,
}

/// Per-record outcome of a repairing load
enum Check {
    Fresh(FileRecord),
    Refreshed(FileRecord),
    Missing(FileRecord),
}

impl MetadataStore {
    /// Empty store writing to `log_path`, made absolute. The log is not read.
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let log_path = absolute_log_path(log_path.into())?;
        Ok(Self::from_parts(CatalogIndex::new(), CatalogLog::new(&log_path), log_path))
    }

    fn from_parts(index: CatalogIndex, log: CatalogLog, log_path: PathBuf) -> Self {
        Self {
            state: Mutex::new(StoreState { index, log }),
            log_path,
        }
    }

    /// Restore the catalog from the log at `log_path`.
    pub fn load(
        log_path: impl Into<PathBuf>,
        options: LoadOptions,
        extractor: &FingerprintExtractor,
    ) -> Result<(Self, LoadReport), CatalogError> {
        Self::load_with_events(log_path, options, extractor, &null_sender())
    }

    /// Restore the catalog, reporting progress through `events`.
    ///
    /// Every record is checked against the file system before the store is
    /// built, so no lock is held while files are hashed.
    pub fn load_with_events(
        log_path: impl Into<PathBuf>,
        options: LoadOptions,
        extractor: &FingerprintExtractor,
        events: &EventSender,
    ) -> Result<(Self, LoadReport), CatalogError> {
        let log_path = absolute_log_path(log_path.into())?;
        let mut log = CatalogLog::new(&log_path);
        let mut index = CatalogIndex::new();
        let mut report = LoadReport::default();

        let entries = log.read()?;
        events.send(Event::Catalog(CatalogEvent::LogRead {
            path: log_path.clone(),
            entries: entries.len(),
        }));

        let latest = latest_per_path(entries, &mut report)?;
        let checks = match options.strategy {
            LoadStrategy::Replay => latest
                .into_par_iter()
                .map(check_exists)
                .collect::<Result<Vec<_>, _>>()?,
            LoadStrategy::Repair => latest
                .into_par_iter()
                .map(|record| check_live_file(record, extractor))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for check in checks {
            match check {
                Check::Fresh(record) => {
                    report.restored += 1;
                    index.upsert(record);
                }
                Check::Refreshed(record) => {
                    report.refreshed += 1;
                    log.append(&record)?;
                    events.send(Event::Catalog(CatalogEvent::Refreshed {
                        path: record.path.clone(),
                    }));
                    index.upsert(record);
                }
                Check::Missing(record) => {
                    report.dropped += 1;
                    tracing::warn!(
                        "Dropping {} from the catalog: file no longer exists",
                        record.path.display()
                    );
                    events.send(Event::Catalog(CatalogEvent::Dropped { path: record.path }));
                }
            }
        }

        if options.compact && report.has_history() {
            let backup = log.rewrite(index.records())?;
            events.send(Event::Catalog(CatalogEvent::Compacted {
                backup: backup.clone(),
            }));
            report.compacted = Some(backup);
        }

        tracing::info!(
            "Loaded {} records from {} ({} refreshed, {} dropped)",
            index.len(),
            log_path.display(),
            report.refreshed,
            report.dropped
        );
        events.send(Event::Catalog(CatalogEvent::Loaded {
            records: index.len(),
        }));

        Ok((Self::from_parts(index, log, log_path), report))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append `record` to the log without touching the index.
    pub fn append(&self, record: &FileRecord) -> Result<(), CatalogError> {
        self.lock()?.log.append(record)
    }

    /// Insert or replace the record for `record.path` in the index only.
    pub fn upsert(&self, record: FileRecord) -> Result<bool, CatalogError> {
        Ok(self.lock()?.index.upsert(record))
    }

    /// Forget the record for `path`.
    pub fn remove(&self, path: &Path) -> Result<Option<FileRecord>, CatalogError> {
        Ok(self.lock()?.index.remove(path))
    }

    /// Log `record` and index it, as one step.
    ///
    /// The log line is written first; if that fails the index is untouched.
    pub fn commit(&self, record: FileRecord) -> Result<bool, CatalogError> {
        let mut state = self.lock()?;
        state.log.append(&record)?;
        Ok(state.index.upsert(record))
    }

    /// Compare the record for `path` with the live `stat`, evicting it if it
    /// no longer matches.
    pub fn evict_if_stale(&self, path: &Path, stat: &FileStat) -> Result<Freshness, CatalogError> {
        let mut state = self.lock()?;
        let freshness = match state.index.get(path) {
            None => Freshness::Unknown,
            Some(record) if record.is_fresh(stat) => Freshness::Fresh,
            Some(_) => match state.index.remove(path) {
                Some(old) => Freshness::Stale(old),
                None => Freshness::Unknown,
            },
        };
        Ok(freshness)
    }

    /// Rewrite the log with one line per indexed record. Returns the backup
    /// path of the previous log.
    pub fn compact(&self) -> Result<PathBuf, CatalogError> {
        let mut state = self.lock()?;
        let StoreState { index, log } = &mut *state;
        log.rewrite(index.records())
    }

    pub fn get(&self, path: &Path) -> Result<Option<FileRecord>, CatalogError> {
        Ok(self.lock()?.index.get(path).cloned())
    }

    pub fn len(&self) -> Result<usize, CatalogError> {
        Ok(self.lock()?.index.len())
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.lock()?.index.is_empty())
    }

    /// Run `f` with read access to the index, holding the lock throughout.
    pub fn with_index<T>(&self, f: impl FnOnce(&CatalogIndex) -> T) -> Result<T, CatalogError> {
        Ok(f(&self.lock()?.index))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, CatalogError> {
        self.state.lock().map_err(|_| CatalogError::LockPoisoned {
            path: self.log_path.clone(),
        })
    }
}

/// Collapse the log to its last entry per path, keeping first-seen order.
/// Relative paths are made absolute.
fn latest_per_path(
    entries: Vec<FileRecord>,
    report: &mut LoadReport,
) -> Result<Vec<FileRecord>, CatalogError> {
    let mut latest: Vec<FileRecord> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<PathBuf, usize> = HashMap::with_capacity(entries.len());

    for mut record in entries {
        if record.path.is_relative() {
            let absolute =
                std::path::absolute(&record.path).map_err(|source| CatalogError::Io {
                    path: record.path.clone(),
                    source,
                })?;
            tracing::debug!(
                "Updating relative path {} to {}",
                record.path.display(),
                absolute.display()
            );
            record.path = absolute;
            report.repathed += 1;
        }

        match slots.get(&record.path) {
            Some(&slot) => {
                report.superseded += 1;
                latest[slot] = record;
            }
            None => {
                slots.insert(record.path.clone(), latest.len());
                latest.push(record);
            }
        }
    }

    Ok(latest)
}

fn absolute_log_path(log_path: PathBuf) -> Result<PathBuf, CatalogError> {
    std::path::absolute(&log_path).map_err(|source| CatalogError::Io {
        path: log_path,
        source,
    })
}

/// Existence check for a replaying load
fn check_exists(record: FileRecord) -> Result<Check, CatalogError> {
    match fs::metadata(&record.path) {
        Ok(_) => Ok(Check::Fresh(record)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Check::Missing(record)),
        Err(source) => Err(CatalogError::Io {
            path: record.path,
            source,
        }),
    }
}

fn check_live_file(record: FileRecord, extractor: &FingerprintExtractor) -> Result<Check, CatalogError> {
    let metadata = match fs::metadata(&record.path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Check::Missing(record)),
        Err(source) => {
            return Err(CatalogError::Refresh {
                path: record.path.clone(),
                source: FingerprintError::Io {
                    path: record.path,
                    source,
                },
            })
        }
    };

    if record.is_fresh(&extractor.stat(&metadata)) {
        return Ok(Check::Fresh(record));
    }

    tracing::debug!("Refreshing changed file {}", record.path.display());
    extractor
        .extract(&record.path, &metadata, Some(&record))
        .map(Check::Refreshed)
        .map_err(|source| CatalogError::Refresh {
            path: record.path.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::tests::{at, record};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn log_lines(path: &Path) -> usize {
        fs::read_to_string(path)
            .map(|text| text.lines().count())
            .unwrap_or(0)
    }

    /// Fingerprint `name` under `dir` and log it, returning its path
    fn logged_file(log: &mut CatalogLog, dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        let metadata = fs::metadata(&path).unwrap();
        let rec = FingerprintExtractor::new()
            .extract(&path, &metadata, None)
            .unwrap();
        log.append(&rec).unwrap();
        path
    }

    #[test]
    fn missing_log_loads_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");

        let (store, report) =
            MetadataStore::load(&log_path, LoadOptions::default(), &FingerprintExtractor::new())
                .unwrap();

        assert!(store.is_empty().unwrap());
        assert_eq!(report, LoadReport::default());
        assert!(!log_path.exists());
    }

    #[test]
    fn replay_keeps_last_write_per_path() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let a = temp_dir.path().join("a.jpg");
        let b = temp_dir.path().join("b.jpg");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        let mut log = CatalogLog::new(&log_path);
        log.append(&record(a.to_str().unwrap(), 1, "old")).unwrap();
        log.append(&record(b.to_str().unwrap(), 2, "b")).unwrap();
        log.append(&record(a.to_str().unwrap(), 3, "new")).unwrap();

        let options = LoadOptions {
            compact: false,
            strategy: LoadStrategy::Replay,
        };
        let (store, report) =
            MetadataStore::load(&log_path, options, &FingerprintExtractor::new()).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        // Replay trusts the logged fingerprint even though the size is stale
        assert_eq!(store.get(&a).unwrap().unwrap().content_hash, "new");
        assert_eq!(report.superseded, 1);
        assert_eq!(report.restored, 2);
        store
            .with_index(|index| {
                assert!(!index.bucket_contains("old", &a));
                assert!(index.bucket_contains("new", &a));
            })
            .unwrap();
    }

    #[test]
    fn replay_drops_vanished_files() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let mut log = CatalogLog::new(&log_path);
        let kept = logged_file(&mut log, temp_dir.path(), "b.jpg", b"same");
        let gone = logged_file(&mut log, temp_dir.path(), "a.jpg", b"same");
        fs::remove_file(&gone).unwrap();

        let options = LoadOptions {
            compact: false,
            strategy: LoadStrategy::Replay,
        };
        let (store, report) =
            MetadataStore::load(&log_path, options, &FingerprintExtractor::new()).unwrap();

        assert_eq!(report.restored, 1);
        assert_eq!(report.dropped, 1);
        assert!(store.get(&gone).unwrap().is_none());
        assert!(store.get(&kept).unwrap().is_some());
        let hash = store.get(&kept).unwrap().unwrap().content_hash;
        store
            .with_index(|index| assert_eq!(index.with_digest(&hash).count(), 1))
            .unwrap();
    }

    #[test]
    fn relative_record_paths_are_made_absolute() {
        let mut report = LoadReport::default();
        let latest = latest_per_path(vec![record("photos/a.jpg", 1, "a")], &mut report).unwrap();

        assert_eq!(latest[0].path, std::path::absolute("photos/a.jpg").unwrap());
        assert_eq!(report.repathed, 1);
    }

    #[test]
    fn relative_log_path_is_made_absolute() {
        let store = MetadataStore::new("catalog.jsonl").unwrap();
        let absolute = std::path::absolute("catalog.jsonl").unwrap();

        assert_eq!(store.log_path(), absolute);
        let result = store.commit(record(absolute.to_str().unwrap(), 1, "x"));
        assert!(matches!(result, Err(CatalogError::SelfWrite { .. })));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn repair_drops_vanished_files() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let mut log = CatalogLog::new(&log_path);
        let kept = logged_file(&mut log, temp_dir.path(), "kept.txt", b"kept");
        log.append(&record(
            temp_dir.path().join("gone.txt").to_str().unwrap(),
            4,
            "gone",
        ))
        .unwrap();

        let (store, report) =
            MetadataStore::load(&log_path, LoadOptions::default(), &FingerprintExtractor::new())
                .unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get(&kept).unwrap().is_some());
        assert_eq!(report.dropped, 1);
        assert_eq!(report.restored, 1);
        // Nothing is appended for a dropped record
        assert_eq!(log_lines(&log_path), 2);
    }

    #[test]
    fn repair_refreshes_changed_files() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let mut log = CatalogLog::new(&log_path);
        let path = logged_file(&mut log, temp_dir.path(), "notes.txt", b"first");
        fs::write(&path, b"second version").unwrap();

        let (store, report) =
            MetadataStore::load(&log_path, LoadOptions::default(), &FingerprintExtractor::new())
                .unwrap();

        let refreshed = store.get(&path).unwrap().unwrap();
        assert_eq!(refreshed.size, 14);
        assert_eq!(report.refreshed, 1);
        assert_eq!(log_lines(&log_path), 2);
        store
            .with_index(|index| assert!(index.bucket_contains(&refreshed.content_hash, &path)))
            .unwrap();
    }

    #[test]
    fn record_without_creation_time_is_backfilled() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let path = temp_dir.path().join("old.txt");
        fs::write(&path, b"old").unwrap();
        let metadata = fs::metadata(&path).unwrap();
        let mut legacy = FingerprintExtractor::new()
            .extract(&path, &metadata, None)
            .unwrap();
        legacy.created = None;
        CatalogLog::new(&log_path).append(&legacy).unwrap();

        let (store, report) =
            MetadataStore::load(&log_path, LoadOptions::default(), &FingerprintExtractor::new())
                .unwrap();

        assert_eq!(report.refreshed, 1);
        assert!(store.get(&path).unwrap().unwrap().created.is_some());
    }

    #[test]
    fn compaction_after_delete_and_change_keeps_live_records() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let mut log = CatalogLog::new(&log_path);
        let a = logged_file(&mut log, temp_dir.path(), "a.txt", b"alpha");
        let b = logged_file(&mut log, temp_dir.path(), "b.txt", b"beta");
        let c = logged_file(&mut log, temp_dir.path(), "c.txt", b"gamma");
        fs::remove_file(&b).unwrap();
        fs::write(&c, b"gamma, edited").unwrap();

        let options = LoadOptions {
            compact: true,
            strategy: LoadStrategy::Repair,
        };
        let (store, report) =
            MetadataStore::load(&log_path, options, &FingerprintExtractor::new()).unwrap();

        let backup = report.compacted.expect("log should be compacted");
        // Three original lines plus the refreshed record for c
        assert_eq!(log_lines(&backup), 4);

        let compacted = CatalogLog::new(&log_path).read().unwrap();
        let paths: Vec<_> = compacted.iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, vec![a.clone(), c.clone()]);
        assert_eq!(compacted[1].size, 13);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn clean_log_is_not_compacted() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let mut log = CatalogLog::new(&log_path);
        logged_file(&mut log, temp_dir.path(), "a.txt", b"alpha");

        let options = LoadOptions {
            compact: true,
            strategy: LoadStrategy::Repair,
        };
        let (_, report) =
            MetadataStore::load(&log_path, options, &FingerprintExtractor::new()).unwrap();

        assert_eq!(report.compacted, None);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn commit_logs_and_indexes() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let store = MetadataStore::new(&log_path).unwrap();

        assert!(!store.commit(record("/photos/a.jpg", 1, "a")).unwrap());
        assert!(store.commit(record("/photos/a.jpg", 2, "b")).unwrap());

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(log_lines(&log_path), 2);
    }

    #[test]
    fn commit_refuses_the_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let store = MetadataStore::new(&log_path).unwrap();

        let result = store.commit(record(log_path.to_str().unwrap(), 1, "x"));

        assert!(matches!(result, Err(CatalogError::SelfWrite { .. })));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn evict_if_stale_removes_changed_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("catalog.jsonl")).unwrap();
        store.upsert(record("/photos/a.jpg", 10, "a")).unwrap();
        let path = Path::new("/photos/a.jpg");
        let stat = FileStat {
            size: 10,
            created: at(1_600_000_000),
            modified: at(1_600_000_000),
        };

        assert_eq!(store.evict_if_stale(path, &stat).unwrap(), Freshness::Fresh);

        let changed = FileStat { size: 11, ..stat };
        match store.evict_if_stale(path, &changed).unwrap() {
            Freshness::Stale(old) => assert_eq!(old.content_hash, "a"),
            other => panic!("expected stale record, got {other:?}"),
        }
        assert!(store.get(path).unwrap().is_none());
        assert_eq!(store.evict_if_stale(path, &changed).unwrap(), Freshness::Unknown);
    }

    #[test]
    fn concurrent_commits_all_reach_the_log() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let store = Arc::new(MetadataStore::new(&log_path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        let path = format!("/photos/{worker}/{i}.jpg");
                        store.commit(record(&path, 1, &path)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 100);
        assert_eq!(CatalogLog::new(&log_path).read().unwrap().len(), 100);
    }

    #[test]
    fn compact_after_removal_drops_the_line() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("catalog.jsonl");
        let store = MetadataStore::new(&log_path).unwrap();
        store.commit(record("/photos/a.jpg", 1, "a")).unwrap();
        store.commit(record("/photos/b.jpg", 1, "b")).unwrap();
        store.remove(Path::new("/photos/a.jpg")).unwrap();

        let backup = store.compact().unwrap();

        assert_eq!(log_lines(&backup), 2);
        assert_eq!(log_lines(&log_path), 1);
    }
}
