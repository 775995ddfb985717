//! Append-only, newline-delimited JSON log behind the catalog.

use super::FileRecord;
use crate::error::CatalogError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Suffix of the scratch file a compaction writes before swapping it in
const COMPACTION_SUFFIX: &str = "compacting";

/// The on-disk log file.
///
/// The append handle is opened lazily and reused; compaction drops it so the
/// next append opens the fresh file.
pub struct CatalogLog {
    path: PathBuf,
    writer: Option<File>,
}

impl CatalogLog {
    /// Create a handle for the log at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch file used while compacting
    pub fn compaction_path(&self) -> PathBuf {
        with_suffix(&self.path, COMPACTION_SUFFIX)
    }

    /// Read every entry in order. A missing log reads as empty.
    ///
    /// Blank lines are skipped; any other line that is not a record aborts
    /// the read.
    pub fn read(&self) -> Result<Vec<FileRecord>, CatalogError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FileRecord =
                serde_json::from_str(&line).map_err(|source| CatalogError::Corrupt {
                    path: self.path.clone(),
                    line: number + 1,
                    source,
                })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Append one record as a single JSON line.
    pub fn append(&mut self, record: &FileRecord) -> Result<(), CatalogError> {
        if record.path == self.path {
            return Err(CatalogError::SelfWrite {
                path: self.path.clone(),
            });
        }

        let line = encode_line(record)?;
        let writer = self.writer()?;
        writer
            .write_all(&line)
            .and_then(|_| writer.flush())
            .map_err(|e| CatalogError::Io {
                path: self.path.clone(),
                source: e,
            })?;

        tracing::debug!("Saved metadata for {}", record.path.display());
        Ok(())
    }

    /// Replace the log with exactly `records`, keeping the old log as a
    /// timestamped backup. Returns the backup path.
    ///
    /// The new contents are written and synced to a scratch file first, so a
    /// crash leaves either the old log or the backup plus a complete scratch
    /// file behind.
    pub fn rewrite<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a FileRecord>,
    ) -> Result<PathBuf, CatalogError> {
        self.writer = None;

        let scratch = self.compaction_path();
        let file = File::create(&scratch).map_err(|e| io_error(&scratch, e))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writer
                .write_all(&encode_line(record)?)
                .map_err(|e| io_error(&scratch, e))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| io_error(&scratch, e.into_error()))?;
        file.sync_all().map_err(|e| io_error(&scratch, e))?;
        drop(file);

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let backup = with_suffix(&self.path, &format!("{stamp:x}"));

        tracing::info!(
            "Compacting catalog {} with backup in {}",
            self.path.display(),
            backup.display()
        );

        match fs::rename(&self.path, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }
        fs::rename(&scratch, &self.path).map_err(|e| self.io_error(e))?;

        Ok(backup)
    }

    fn writer(&mut self) -> Result<&mut File, CatalogError> {
        let file = match self.writer.take() {
            Some(file) => file,
            None => self.open_for_append()?,
        };
        Ok(self.writer.insert(file))
    }

    fn open_for_append(&self) -> Result<File, CatalogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: io::Error) -> CatalogError {
        io_error(&self.path, source)
    }
}

fn io_error(path: &Path, source: io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn encode_line(record: &FileRecord) -> Result<Vec<u8>, CatalogError> {
    let mut line = serde_json::to_vec(record).map_err(|source| CatalogError::Serialize {
        path: record.path.clone(),
        source,
    })?;
    line.push(b'\n');
    Ok(line)
}

/// `catalog.jsonl` + `abc` -> `catalog.jsonl.abc`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
