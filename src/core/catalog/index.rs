//! In-memory indices over catalog records.

use super::FileRecord;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Primary and digest indices.
///
/// The primary map owns every record. Digest buckets hold paths only, so a
/// record indexed under both its content hash and its bitmap hash is still a
/// single value. Zero-length files are never put in a digest bucket.
#[derive(Debug, Default, Clone)]
pub struct CatalogIndex {
    records: BTreeMap<PathBuf, FileRecord>,
    digests: HashMap<String, BTreeSet<PathBuf>>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record for the same path.
    ///
    /// The old record leaves all of its digest buckets before the new one is
    /// added. Returns whether a record was replaced.
    pub fn upsert(&mut self, record: FileRecord) -> bool {
        let replaced = self.remove(&record.path).is_some();

        if record.size > 0 {
            for digest in record.digests() {
                self.digests
                    .entry(digest.to_string())
                    .or_default()
                    .insert(record.path.clone());
            }
        }
        self.records.insert(record.path.clone(), record);

        replaced
    }

    /// Remove the record stored under `path` from every index.
    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        let record = self.records.remove(path)?;

        for digest in record.digests() {
            if let Some(bucket) = self.digests.get_mut(digest) {
                bucket.remove(path);
                if bucket.is_empty() {
                    self.digests.remove(digest);
                }
            }
        }

        Some(record)
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// All records, in path order
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Records indexed under `digest`, in path order
    pub fn with_digest<'a>(&'a self, digest: &str) -> impl Iterator<Item = &'a FileRecord> + 'a {
        self.digests
            .get(digest)
            .into_iter()
            .flatten()
            .filter_map(move |path| self.records.get(path))
    }

    /// Whether `path` sits in the bucket for `digest`
    pub fn bucket_contains(&self, digest: &str, path: &Path) -> bool {
        self.digests
            .get(digest)
            .is_some_and(|bucket| bucket.contains(path))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of non-empty digest buckets
    pub fn digest_count(&self) -> usize {
        self.digests.len()
    }
}
