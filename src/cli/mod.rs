//! # CLI Module
//!
//! Command-line front end for the media cleaner.
//!
//! ## Usage
//! ```bash
//! # Catalog a photo library
//! media-cleaner ~/Pictures
//!
//! # Report duplicates found in a download folder
//! media-cleaner ~/Pictures ~/Downloads --duplicates ~/Downloads
//!
//! # Move them out of the way (dry run unless --apply)
//! media-cleaner --duplicates ~/Downloads --move-to ~/dupes --strip-prefix ~ --apply
//!
//! # Full catalog report as JSON
//! media-cleaner --report --output json
//! ```

use clap::{Parser, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use media_cleaner::core::catalog::{LoadOptions, LoadReport, LoadStrategy, MetadataStore};
use media_cleaner::core::fingerprint::FingerprintExtractor;
use media_cleaner::core::pipeline::{ScanPipeline, ScanSummary};
use media_cleaner::core::relocator::{MoveStatus, RelocateOutcome, Relocator};
use media_cleaner::core::resolver::{DuplicateResolver, Resolution, Scopes};
use media_cleaner::error::{DedupError, Result};
use media_cleaner::events::{
    CatalogEvent, Event, EventChannel, EventSender, Phase, RelocateEvent, ScanEvent,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Media Cleaner - find duplicate photos and videos, keep one master
#[derive(Parser, Debug)]
#[command(name = "media-cleaner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories to scan into the catalog
    roots: Vec<PathBuf>,

    /// Catalog log file
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Compact the catalog log after loading and after moves
    #[arg(long)]
    compact: bool,

    /// How to treat catalog entries when loading
    #[arg(long, default_value = "repair")]
    load_strategy: Strategy,

    /// Directory whose files are candidate duplicates
    #[arg(long, value_name = "DIR")]
    duplicates: Option<PathBuf>,

    /// Directory whose files are preferred as masters
    #[arg(long, value_name = "DIR")]
    masters: Option<PathBuf>,

    /// Move duplicates under this directory
    #[arg(long, value_name = "DIR")]
    move_to: Option<PathBuf>,

    /// Prefix removed from duplicate paths before joining them to --move-to
    #[arg(long, value_name = "DIR", requires = "move_to")]
    strip_prefix: Option<PathBuf>,

    /// Actually move files (default is a dry run)
    #[arg(long, requires = "move_to")]
    apply: bool,

    /// Report duplicates across the whole catalog
    #[arg(long)]
    report: bool,

    /// Number of fingerprint workers
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_symlinks: bool,

    /// Skip hidden files and directories
    #[arg(long)]
    skip_hidden: bool,

    /// Maximum directory depth below each root
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Report format
    #[arg(short, long, default_value = "pretty")]
    output: OutputFormat,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Re-check every entry against the file system
    Repair,
    /// Trust the log as written
    Replay,
}

impl From<Strategy> for LoadStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Repair => LoadStrategy::Repair,
            Strategy::Replay => LoadStrategy::Replay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (duplicate paths only)
    Minimal,
}

impl Cli {
    fn wants_resolution(&self) -> bool {
        self.duplicates.is_some() || self.masters.is_some() || self.move_to.is_some() || self.report
    }

    fn db_path(&self) -> Result<PathBuf> {
        if let Some(db) = &self.db {
            return Ok(db.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("media-cleaner").join("catalog.jsonl"))
            .ok_or_else(|| DedupError::Config("no data directory; pass --db".into()))
    }

    fn workers(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Everything one run produced, for the report
#[derive(Debug, Default)]
struct RunResult {
    db: PathBuf,
    load: LoadReport,
    scan: Option<ScanSummary>,
    resolution: Option<Resolution>,
    relocation: Option<RelocateOutcome>,
    compacted: Option<PathBuf>,
    records: usize,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    media_cleaner::init_tracing(cli.verbose);

    let db = cli.db_path()?;
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent).map_err(|source| {
            DedupError::Config(format!("cannot create {}: {source}", parent.display()))
        })?;
    }

    let term = Term::stderr();
    let pretty = matches!(cli.output, OutputFormat::Pretty);
    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("Media Cleaner").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let (sender, receiver) = EventChannel::new();
    let progress = pretty.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress_clone else {
                continue;
            };
            match event {
                Event::Catalog(CatalogEvent::LogRead { entries, .. }) => {
                    pb.set_prefix(Phase::Loading.to_string());
                    pb.set_message(format!("{entries} log entries"));
                }
                Event::Catalog(CatalogEvent::Compacted { .. }) => {
                    pb.set_prefix(Phase::Compacting.to_string());
                }
                Event::Scan(ScanEvent::Started { .. }) => {
                    pb.set_prefix(Phase::Scanning.to_string());
                }
                Event::Scan(ScanEvent::Progress(p)) => {
                    pb.set_message(format!(
                        "{} files ({} unchanged) {}",
                        p.files_seen,
                        p.unchanged,
                        p.current_path
                            .file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                    ));
                }
                Event::Resolve(_) => {
                    pb.set_prefix(Phase::Resolving.to_string());
                    pb.set_message("");
                }
                Event::Relocate(RelocateEvent::Moved { source, .. })
                | Event::Relocate(RelocateEvent::Planned { source, .. }) => {
                    pb.set_prefix(Phase::Relocating.to_string());
                    pb.set_message(source.display().to_string());
                }
                _ => {}
            }
        }
        if let Some(pb) = progress_clone {
            pb.finish_and_clear();
        }
    });

    let result = execute(&cli, &db, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    let result = result?;
    match cli.output {
        OutputFormat::Pretty => print_pretty_results(&term, &cli, &result),
        OutputFormat::Json => print_json_results(&result)?,
        OutputFormat::Minimal => print_minimal_results(&result),
    }

    Ok(())
}

fn execute(cli: &Cli, db: &Path, events: &EventSender) -> Result<RunResult> {
    let extractor = FingerprintExtractor::new();
    let options = LoadOptions {
        compact: cli.compact,
        strategy: cli.load_strategy.into(),
    };
    let (store, load) = MetadataStore::load_with_events(db, options, &extractor, events)?;
    let mut result = RunResult {
        db: db.to_path_buf(),
        load,
        ..RunResult::default()
    };

    if !cli.roots.is_empty() {
        let pipeline = ScanPipeline::builder()
            .roots(cli.roots.clone())
            .concurrency(cli.workers())
            .follow_symlinks(cli.follow_symlinks)
            .include_hidden(!cli.skip_hidden)
            .max_depth(cli.max_depth)
            .extractor(extractor)
            .build();
        result.scan = Some(pipeline.run_with_events(&store, events)?);
    }

    if cli.wants_resolution() {
        let scopes = Scopes::new(cli.duplicates.as_deref(), cli.masters.as_deref())?;
        let resolution = DuplicateResolver::new(scopes).resolve_with_events(&store, events)?;

        if let Some(move_to) = &cli.move_to {
            let relocator = Relocator::new(move_to, cli.strip_prefix.as_deref(), cli.apply)?;
            let outcome = relocator.relocate_with_events(&resolution.groups, &store, events)?;
            if cli.compact && outcome.moved_any() {
                result.compacted = Some(store.compact()?);
            }
            result.relocation = Some(outcome);
        }
        result.resolution = Some(resolution);
    }

    result.records = store.len()?;
    Ok(result)
}

fn print_pretty_results(term: &Term, cli: &Cli, result: &RunResult) {
    let load = &result.load;
    term.write_line(&format!(
        "{} Catalog {}",
        style("✓").green().bold(),
        style(display_path(&result.db)).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} records ({} restored, {} refreshed, {} dropped)",
        style(result.records).cyan(),
        load.restored,
        load.refreshed,
        load.dropped
    ))
    .ok();
    if let Some(backup) = load.compacted.as_ref().or(result.compacted.as_ref()) {
        term.write_line(&format!(
            "  compacted, previous log kept at {}",
            style(display_path(backup)).dim()
        ))
        .ok();
    }

    if let Some(scan) = &result.scan {
        term.write_line(&format!(
            "  {} files scanned in {:.1}s, {} fingerprinted, {} unchanged",
            style(scan.files_seen).cyan(),
            scan.duration_ms as f64 / 1000.0,
            style(scan.fingerprinted).cyan(),
            scan.unchanged
        ))
        .ok();
        if scan.walk_errors > 0 {
            term.write_line(&format!(
                "  {} entries could not be read",
                style(scan.walk_errors).yellow()
            ))
            .ok();
        }
    }
    term.write_line("").ok();

    let Some(resolution) = &result.resolution else {
        return;
    };

    term.write_line(&format!(
        "  {} duplicate groups, {} duplicates, {} reclaimable",
        style(resolution.groups.len()).cyan(),
        style(resolution.duplicate_count()).cyan(),
        style(format_bytes(resolution.reclaimable_bytes())).yellow()
    ))
    .ok();
    term.write_line("").ok();

    if resolution.groups.is_empty() && resolution.findings.is_empty() {
        term.write_line(&format!("  {} No duplicates found!", style("✓").green()))
            .ok();
    }

    for (i, group) in resolution.groups.iter().enumerate() {
        term.write_line(&format!(
            "  {} {}",
            style(format!("Group {}:", i + 1)).bold(),
            format_bytes(group.reclaimable_bytes())
        ))
        .ok();
        term.write_line(&format!(
            "    {} {}",
            style("★").green(),
            display_path(&group.master.path)
        ))
        .ok();
        for duplicate in &group.duplicates {
            term.write_line(&format!(
                "    {} {}",
                style("○").dim(),
                display_path(&duplicate.path)
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    if !resolution.findings.is_empty() {
        term.write_line(&format!("{}", style("Findings:").bold().underlined()))
            .ok();
        for finding in &resolution.findings {
            term.write_line(&format!(
                "  {} {} (master {})",
                style(finding.kind.to_string()).yellow(),
                display_path(&finding.duplicate),
                display_path(&finding.master)
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    match &result.relocation {
        Some(outcome) if outcome.moved_any() => {
            term.write_line(&format!(
                "{} Moved {} files ({})",
                style("✓").green().bold(),
                outcome.count(MoveStatus::Moved),
                format_bytes(outcome.moved_bytes())
            ))
            .ok();
        }
        Some(outcome) => {
            let planned = outcome.count(MoveStatus::Planned);
            if planned > 0 {
                term.write_line(&format!(
                    "{}",
                    style(format!(
                        "Dry run: {planned} files would be moved. Pass --apply to move them."
                    ))
                    .dim()
                ))
                .ok();
            }
        }
        None => {
            term.write_line(&format!(
                "{}",
                style("No files were moved. Use --move-to to relocate duplicates.").dim()
            ))
            .ok();
        }
    }

    if let Some(outcome) = &result.relocation {
        let kept = outcome.count(MoveStatus::MissingMaster);
        if kept > 0 {
            term.write_line(&format!(
                "{} Kept {kept} duplicates whose master no longer exists",
                style("!").yellow().bold()
            ))
            .ok();
        }
    }
}

fn print_json_results(result: &RunResult) -> Result<()> {
    let output = serde_json::json!({
        "catalog": result.db,
        "records": result.records,
        "load": {
            "restored": result.load.restored,
            "refreshed": result.load.refreshed,
            "dropped": result.load.dropped,
            "superseded": result.load.superseded,
            "repathed": result.load.repathed,
            "compacted": result.load.compacted,
        },
        "scan": result.scan,
        "groups": result.resolution.as_ref().map(|r| &r.groups),
        "findings": result.resolution.as_ref().map(|r| &r.findings),
        "reclaimable_bytes": result.resolution.as_ref().map(|r| r.reclaimable_bytes()),
        "moves": result.relocation.as_ref().map(|o| &o.moves),
        "compacted": result.compacted,
    });

    let text = serde_json::to_string_pretty(&output)
        .map_err(|e| DedupError::Config(format!("cannot render report: {e}")))?;
    println!("{text}");
    Ok(())
}

fn print_minimal_results(result: &RunResult) {
    let Some(resolution) = &result.resolution else {
        return;
    };
    for duplicate in resolution.groups.iter().flat_map(|g| &g.duplicates) {
        println!("{}", duplicate.path.display());
    }
}

fn display_path(path: &Path) -> String {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(relative) => format!("~/{}", relative.display()),
        None => path.display().to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn resolver_runs_only_when_asked() {
        let cli = Cli::parse_from(["media-cleaner", "/photos"]);
        assert!(!cli.wants_resolution());

        let cli = Cli::parse_from(["media-cleaner", "--report"]);
        assert!(cli.wants_resolution());

        let cli = Cli::parse_from(["media-cleaner", "--move-to", "/dupes", "--apply"]);
        assert!(cli.wants_resolution());
        assert!(cli.apply);
    }

    #[test]
    fn apply_requires_a_destination() {
        assert!(Cli::try_parse_from(["media-cleaner", "--apply"]).is_err());
    }

    #[test]
    fn explicit_db_and_concurrency_are_used() {
        let cli = Cli::parse_from(["media-cleaner", "--db", "/tmp/c.jsonl", "-j", "3", "-vv"]);
        assert_eq!(cli.db_path().unwrap(), PathBuf::from("/tmp/c.jsonl"));
        assert_eq!(cli.workers(), 3);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.load_strategy, Strategy::Repair));
    }
}
