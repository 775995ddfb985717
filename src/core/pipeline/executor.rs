//! Scan pipeline execution.

use crate::core::catalog::{FileRecord, Freshness, MetadataStore};
use crate::core::fingerprint::FingerprintExtractor;
use crate::core::scanner::{ScanConfig, WalkDirScanner, WalkedFile};
use crate::error::ScanError;
use crate::events::{null_sender, Event, EventSender, ScanEvent, ScanProgress};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

/// Jobs and results each queue this many items per worker
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Result of a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Regular files walked
    pub files_seen: usize,
    /// Files whose catalog record was still fresh
    pub unchanged: usize,
    /// Files fingerprinted and committed
    pub fingerprinted: usize,
    /// Entries skipped because they could not be read
    pub walk_errors: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Configuration for the scan pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directories to scan
    pub roots: Vec<PathBuf>,
    /// Number of fingerprinting workers
    pub concurrency: usize,
    /// Walk configuration
    pub scan_config: ScanConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            concurrency: thread::available_parallelism().map_or(1, |n| n.get()),
            scan_config: ScanConfig::default(),
        }
    }
}

/// Builder for the scan pipeline
pub struct ScanPipelineBuilder {
    config: PipelineConfig,
    extractor: Option<FingerprintExtractor>,
}

impl ScanPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            extractor: None,
        }
    }

    /// Directories to scan
    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.roots = roots;
        self
    }

    /// Number of fingerprinting workers (at least one)
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers.max(1);
        self
    }

    pub fn scan_config(mut self, config: ScanConfig) -> Self {
        self.config.scan_config = config;
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.scan_config.follow_symlinks = follow;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.config.scan_config.include_hidden = include;
        self
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.config.scan_config.max_depth = depth;
        self
    }

    /// Replace the default fingerprint backends
    pub fn extractor(mut self, extractor: FingerprintExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn build(self) -> ScanPipeline {
        ScanPipeline {
            config: self.config,
            extractor: self.extractor.unwrap_or_default(),
        }
    }
}

impl Default for ScanPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A file that needs fingerprinting
struct Job {
    path: PathBuf,
    metadata: Metadata,
    /// Record evicted because the file changed
    previous: Option<FileRecord>,
}

/// Shared state of one run
struct RunState<'a> {
    store: &'a MetadataStore,
    extractor: &'a FingerprintExtractor,
    events: &'a EventSender,
    /// Jobs queued but not yet committed or discarded
    pending: AtomicUsize,
    fingerprinted: AtomicUsize,
    aborted: AtomicBool,
    failure: OnceLock<ScanError>,
}

impl RunState<'_> {
    /// Keep the first failure and stop the walk
    fn fail(&self, error: ScanError) {
        tracing::error!("Scan failed: {}", error);
        let _ = self.failure.set(error);
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn settle(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Walks the roots and brings the catalog up to date with them.
///
/// One producer (the calling thread) walks and checks freshness, N workers
/// fingerprint, and a single committer thread writes to the catalog.
pub struct ScanPipeline {
    config: PipelineConfig,
    extractor: FingerprintExtractor,
}

impl ScanPipeline {
    pub fn builder() -> ScanPipelineBuilder {
        ScanPipelineBuilder::new()
    }

    /// Run the scan without events
    pub fn run(&self, store: &MetadataStore) -> Result<ScanSummary, ScanError> {
        self.run_with_events(store, &null_sender())
    }

    /// Run the scan with event reporting
    pub fn run_with_events(
        &self,
        store: &MetadataStore,
        events: &EventSender,
    ) -> Result<ScanSummary, ScanError> {
        let start_time = Instant::now();
        let roots = self.resolve_roots()?;

        events.send(Event::Scan(ScanEvent::Started {
            roots: roots.clone(),
        }));
        tracing::info!(
            "Scanning {} root(s) with {} worker(s)",
            roots.len(),
            self.config.concurrency
        );

        let scanner = self.scanner(store);
        let workers = self.config.concurrency.max(1);
        let (job_tx, job_rx) = bounded::<Job>(workers * QUEUE_DEPTH_PER_WORKER);
        let (record_tx, record_rx) = bounded::<FileRecord>(workers * QUEUE_DEPTH_PER_WORKER);

        let state = RunState {
            store,
            extractor: &self.extractor,
            events,
            pending: AtomicUsize::new(0),
            fingerprinted: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            failure: OnceLock::new(),
        };

        let mut summary = thread::scope(|scope| {
            let state = &state;

            let fingerprinters: Vec<_> = (0..workers)
                .map(|_| {
                    let job_rx = job_rx.clone();
                    let record_tx = record_tx.clone();
                    scope.spawn(move || fingerprint_jobs(state, job_rx, record_tx))
                })
                .collect();
            drop(job_rx);
            drop(record_tx);

            let committer = scope.spawn(move || commit_records(state, record_rx));

            let summary = produce_jobs(state, &scanner, &roots, job_tx);

            let mut panicked = false;
            for handle in fingerprinters {
                panicked |= handle.join().is_err();
            }
            panicked |= committer.join().is_err();
            if panicked {
                state.fail(ScanError::WorkerPanicked);
            }

            summary
        });

        let failure = state.failure.into_inner();
        let unsettled = state.pending.load(Ordering::SeqCst);
        if let Some(error) = failure {
            return Err(error);
        }
        if unsettled > 0 {
            return Err(ScanError::QueueClosed);
        }

        summary.fingerprinted = state.fingerprinted.load(Ordering::SeqCst);
        summary.duration_ms = start_time.elapsed().as_millis() as u64;

        events.send(Event::Scan(ScanEvent::Completed {
            files_seen: summary.files_seen,
            fingerprinted: summary.fingerprinted,
        }));
        tracing::info!(
            "Scanned {} files: {} unchanged, {} fingerprinted, {} unreadable",
            summary.files_seen,
            summary.unchanged,
            summary.fingerprinted,
            summary.walk_errors
        );

        Ok(summary)
    }

    /// Absolute roots; every root must exist
    fn resolve_roots(&self) -> Result<Vec<PathBuf>, ScanError> {
        self.config
            .roots
            .iter()
            .map(|root| {
                let absolute = std::path::absolute(root).map_err(|source| ScanError::InvalidPath {
                    path: root.clone(),
                    source,
                })?;
                if !absolute.exists() {
                    return Err(ScanError::RootNotFound { path: absolute });
                }
                Ok(absolute)
            })
            .collect()
    }

    /// Walker that never yields the catalog's own files
    fn scanner(&self, store: &MetadataStore) -> WalkDirScanner {
        WalkDirScanner::new(self.config.scan_config.clone()).skip_catalog(store.log_path())
    }
}

/// Producer: walk, evict stale records and queue jobs until done or aborted
fn produce_jobs(
    state: &RunState<'_>,
    scanner: &WalkDirScanner,
    roots: &[PathBuf],
    jobs: Sender<Job>,
) -> ScanSummary {
    let mut summary = ScanSummary::default();

    'roots: for root in roots {
        let mut walk = scanner.files(root, state.events);

        for WalkedFile { path, metadata } in walk.by_ref() {
            if state.is_aborted() {
                break;
            }
            summary.files_seen += 1;

            let stat = state.extractor.stat(&metadata);
            let freshness = match state.store.evict_if_stale(&path, &stat) {
                Ok(freshness) => freshness,
                Err(e) => {
                    state.fail(e.into());
                    break;
                }
            };

            if freshness == Freshness::Fresh {
                summary.unchanged += 1;
            }
            state.events.send(Event::Scan(ScanEvent::Progress(ScanProgress {
                files_seen: summary.files_seen,
                unchanged: summary.unchanged,
                current_path: path.clone(),
            })));

            let previous = match freshness {
                Freshness::Fresh => {
                    tracing::trace!("Unchanged {}", path.display());
                    continue;
                }
                Freshness::Stale(old) => {
                    tracing::debug!("Rescanning changed file {}", path.display());
                    Some(old)
                }
                Freshness::Unknown => None,
            };

            state.pending.fetch_add(1, Ordering::SeqCst);
            let job = Job {
                path,
                metadata,
                previous,
            };
            if jobs.send(job).is_err() {
                state.settle();
                state.fail(ScanError::QueueClosed);
                break;
            }
        }

        summary.walk_errors += walk.errors();
        if state.is_aborted() {
            break 'roots;
        }
    }

    summary
}

/// Worker: fingerprint queued files. After a failure, remaining jobs are
/// discarded unprocessed.
fn fingerprint_jobs(state: &RunState<'_>, jobs: Receiver<Job>, records: Sender<FileRecord>) {
    for job in jobs.iter() {
        if state.is_aborted() {
            state.settle();
            continue;
        }

        match state
            .extractor
            .extract(&job.path, &job.metadata, job.previous.as_ref())
        {
            // Settled by the committer
            Ok(record) => {
                if records.send(record).is_err() {
                    state.fail(ScanError::QueueClosed);
                }
            }
            Err(e) => {
                state.settle();
                state.fail(e.into());
            }
        }
    }
}

/// Committer: the only thread that writes to the catalog during a scan
fn commit_records(state: &RunState<'_>, records: Receiver<FileRecord>) {
    for record in records.iter() {
        let path = record.path.clone();
        match state.store.commit(record) {
            Ok(_) => {
                state.fingerprinted.fetch_add(1, Ordering::SeqCst);
                state
                    .events
                    .send(Event::Scan(ScanEvent::Fingerprinted { path }));
            }
            Err(e) => state.fail(e.into()),
        }
        state.settle();
    }
}
