//! # Resolver Module
//!
//! Groups catalog records into masters and their duplicates.
//!
//! ## Matching
//! Records match when they share a content hash (byte-identical) or a bitmap
//! hash (same picture, different encoding). Only content matches are
//! actionable; bitmap-only matches are reported as findings.
//!
//! ## Scopes
//! - masters scope: seeds are the records under it and matches are looked
//!   for in the duplicates scope (anywhere if there is none)
//! - duplicates scope only: seeds are the records under it; masters may be
//!   anywhere in the catalog
//! - neither: every record is a seed
//!
//! Every match that is not actionable because of where it lives becomes a
//! [`Finding`] instead.

mod master;
mod scope;

pub use master::{compare as compare_masters, pick as pick_master};
pub use scope::Scopes;

use crate::core::catalog::{CatalogIndex, FileRecord, MetadataStore};
use crate::error::ResolveError;
use crate::events::{null_sender, Event, EventSender, ResolveEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A master and the byte-identical copies that can be moved away
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub master: FileRecord,
    /// Ordered by path
    pub duplicates: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Bytes freed by removing every duplicate
    pub fn reclaimable_bytes(&self) -> u64 {
        self.duplicates.iter().map(|d| d.size).sum()
    }
}

/// Why a match was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingKind {
    /// The copy lives in the masters directory itself
    DuplicateInMastersDir,
    /// The copy is outside the duplicates directory
    DuplicateOutsideScope,
    /// The chosen master is not in the masters directory
    MasterOutsideMastersDir,
    /// Same picture, different bytes
    ImageMatch,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::DuplicateInMastersDir => write!(f, "Duplicate is in master directory"),
            FindingKind::DuplicateOutsideScope => {
                write!(f, "Duplicate outside duplicates directory")
            }
            FindingKind::MasterOutsideMastersDir => {
                write!(f, "Master is outside of master directory")
            }
            FindingKind::ImageMatch => write!(f, "Image duplicate"),
        }
    }
}

/// A reported, non-actionable match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub master: PathBuf,
    pub duplicate: PathBuf,
    pub kind: FindingKind,
}

/// Outcome of a duplicate search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Actionable groups, in the order their seeds were visited
    pub groups: Vec<DuplicateGroup>,
    pub findings: Vec<Finding>,
}

impl Resolution {
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.duplicates.len()).sum()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::reclaimable_bytes).sum()
    }

    /// The master recorded for `duplicate`, if it is actionable
    pub fn master_of(&self, duplicate: &Path) -> Option<&FileRecord> {
        self.groups
            .iter()
            .find(|g| g.duplicates.iter().any(|d| d.path == duplicate))
            .map(|g| &g.master)
    }
}

/// Finds duplicates in the catalog
pub struct DuplicateResolver {
    scopes: Scopes,
}

impl DuplicateResolver {
    pub fn new(scopes: Scopes) -> Self {
        Self { scopes }
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Search the catalog without events
    pub fn resolve(&self, store: &MetadataStore) -> Result<Resolution, ResolveError> {
        self.resolve_with_events(store, &null_sender())
    }

    /// Search the catalog, holding its lock for the duration
    pub fn resolve_with_events(
        &self,
        store: &MetadataStore,
        events: &EventSender,
    ) -> Result<Resolution, ResolveError> {
        match (self.scopes.duplicates(), self.scopes.masters()) {
            (Some(dups), Some(masters)) => tracing::info!(
                "Searching for duplicates in {} with masters in {}",
                dups.display(),
                masters.display()
            ),
            (Some(dups), None) => {
                tracing::info!("Searching for duplicates in {}", dups.display())
            }
            (None, Some(masters)) => tracing::info!(
                "Searching for duplicates across the catalog with masters in {}",
                masters.display()
            ),
            (None, None) => tracing::info!("Searching for duplicates across the catalog"),
        }

        let resolution = store.with_index(|index| self.resolve_index(index, events))?;

        tracing::info!(
            "Found {} duplicates of {} masters, {} reported matches",
            resolution.duplicate_count(),
            resolution.groups.len(),
            resolution.findings.len()
        );
        Ok(resolution)
    }

    /// Search an index directly
    pub fn resolve_index(&self, index: &CatalogIndex, events: &EventSender) -> Resolution {
        let seeds: Vec<&FileRecord> = index
            .records()
            .filter(|r| self.scopes.is_seed(&r.path))
            .collect();
        events.send(Event::Resolve(ResolveEvent::Started { seeds: seeds.len() }));

        let mut visited: HashSet<&Path> = HashSet::new();
        let mut resolution = Resolution::default();

        for seed in seeds {
            if visited.contains(seed.path.as_path()) {
                continue;
            }

            let mut members = self.candidates(index, seed, &visited);
            if members.is_empty() {
                continue;
            }
            members.insert(seed.path.as_path(), seed);

            let Some(master) = master::pick(members.values().copied(), &self.scopes) else {
                continue;
            };
            tracing::debug!(
                "Picked master {} among {} matches",
                master.path.display(),
                members.len()
            );
            visited.insert(master.path.as_path());

            let mut duplicates = Vec::new();
            for member in members.values().copied() {
                if member.path == master.path {
                    continue;
                }
                match self.classify(master, member) {
                    Some(kind) => {
                        tracing::debug!("{}: {}", kind, member.path.display());
                        resolution.findings.push(Finding {
                            master: master.path.clone(),
                            duplicate: member.path.clone(),
                            kind,
                        });
                    }
                    None => {
                        visited.insert(member.path.as_path());
                        duplicates.push(member.clone());
                    }
                }
            }

            if !duplicates.is_empty() {
                events.send(Event::Resolve(ResolveEvent::GroupFound {
                    master: master.path.clone(),
                    duplicates: duplicates.len(),
                }));
                resolution.groups.push(DuplicateGroup {
                    master: master.clone(),
                    duplicates,
                });
            }
        }

        events.send(Event::Resolve(ResolveEvent::Completed {
            groups: resolution.groups.len(),
            findings: resolution.findings.len(),
        }));
        resolution
    }

    /// Unvisited records sharing a digest with `seed`, keyed by path
    fn candidates<'a>(
        &self,
        index: &'a CatalogIndex,
        seed: &'a FileRecord,
        visited: &HashSet<&'a Path>,
    ) -> BTreeMap<&'a Path, &'a FileRecord> {
        let mut members = BTreeMap::new();
        for digest in seed.digests() {
            for candidate in index.with_digest(digest) {
                if candidate.path == seed.path
                    || visited.contains(candidate.path.as_path())
                    || !self.scopes.in_search(&candidate.path)
                {
                    continue;
                }
                members.insert(candidate.path.as_path(), candidate);
            }
        }
        members
    }

    /// `None` for a confirmed duplicate, otherwise why it is only reported
    fn classify(&self, master: &FileRecord, member: &FileRecord) -> Option<FindingKind> {
        let scopes = &self.scopes;
        if scopes.in_masters(&member.path) && scopes.masters_differ() {
            Some(FindingKind::DuplicateInMastersDir)
        } else if scopes.duplicates().is_some() && !scopes.in_duplicates(&member.path) {
            Some(FindingKind::DuplicateOutsideScope)
        } else if scopes.masters().is_some() && !scopes.in_masters(&master.path) {
            Some(FindingKind::MasterOutsideMastersDir)
        } else if !member.same_content(master) {
            Some(FindingKind::ImageMatch)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::tests::{at, record};

    fn index_of(records: Vec<FileRecord>) -> CatalogIndex {
        let mut index = CatalogIndex::new();
        for record in records {
            index.upsert(record);
        }
        index
    }

    fn resolve(scopes: Scopes, records: Vec<FileRecord>) -> Resolution {
        DuplicateResolver::new(scopes).resolve_index(&index_of(records), &null_sender())
    }

    fn paths(records: &[FileRecord]) -> Vec<&Path> {
        records.iter().map(|r| r.path.as_path()).collect()
    }

    #[test]
    fn identical_files_form_one_group() {
        let mut first = record("/dup/a.jpg", 10, "same");
        first.created = Some(at(1_000));
        let mut second = record("/dup/b.jpg", 10, "same");
        second.created = Some(at(2_000));

        let scopes = Scopes::new(Some(Path::new("/dup")), None).unwrap();
        let resolution = resolve(scopes, vec![second, first]);

        assert_eq!(resolution.groups.len(), 1);
        let group = &resolution.groups[0];
        assert_eq!(group.master.path, Path::new("/dup/a.jpg"));
        assert_eq!(paths(&group.duplicates), vec![Path::new("/dup/b.jpg")]);
        assert!(resolution.findings.is_empty());
    }

    #[test]
    fn unique_files_produce_nothing() {
        let resolution = resolve(
            Scopes::unrestricted(),
            vec![record("/a.jpg", 1, "a"), record("/b.jpg", 1, "b")],
        );

        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn empty_files_are_never_duplicates() {
        let empty = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let resolution = resolve(
            Scopes::unrestricted(),
            vec![record("/a.txt", 0, empty), record("/b.txt", 0, empty)],
        );

        assert!(resolution.groups.is_empty());
    }

    #[test]
    fn bitmap_only_match_is_reported_not_actionable() {
        let mut png = record("/photos/a.png", 2_000, "png-bytes");
        png.bitmap_hash = Some("pixels".to_string());
        let mut bmp = record("/photos/a.bmp", 9_000, "bmp-bytes");
        bmp.bitmap_hash = Some("pixels".to_string());

        let resolution = resolve(Scopes::unrestricted(), vec![png, bmp]);

        assert!(resolution.groups.is_empty());
        assert_eq!(
            resolution.findings,
            vec![Finding {
                master: PathBuf::from("/photos/a.bmp"),
                duplicate: PathBuf::from("/photos/a.png"),
                kind: FindingKind::ImageMatch,
            }]
        );
    }

    #[test]
    fn image_match_next_to_exact_copy() {
        let mut original = record("/photos/a.jpg", 10, "jpg");
        original.bitmap_hash = Some("pixels".to_string());
        let mut copy = record("/photos/copy.jpg", 10, "jpg");
        copy.bitmap_hash = Some("pixels".to_string());
        let mut reencoded = record("/photos/a.png", 5, "png");
        reencoded.bitmap_hash = Some("pixels".to_string());

        let resolution = resolve(Scopes::unrestricted(), vec![original, copy, reencoded]);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].master.path, Path::new("/photos/a.jpg"));
        assert_eq!(
            paths(&resolution.groups[0].duplicates),
            vec![Path::new("/photos/copy.jpg")]
        );
        assert_eq!(resolution.findings.len(), 1);
        assert_eq!(resolution.findings[0].kind, FindingKind::ImageMatch);
    }

    #[test]
    fn masters_and_duplicates_scopes() {
        let scopes = Scopes::new(Some(Path::new("/B")), Some(Path::new("/A"))).unwrap();
        let records = vec![
            record("/A/keep.jpg", 10, "h"),
            record("/B/copy.jpg", 10, "h"),
            record("/C/other.jpg", 10, "h"),
        ];

        let resolution = resolve(scopes, records);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].master.path, Path::new("/A/keep.jpg"));
        assert_eq!(
            paths(&resolution.groups[0].duplicates),
            vec![Path::new("/B/copy.jpg")]
        );
        assert!(resolution.master_of(Path::new("/C/other.jpg")).is_none());
    }

    #[test]
    fn copy_outside_duplicates_scope_is_only_reported() {
        let scopes = Scopes::new(Some(Path::new("/dup")), None).unwrap();
        let records = vec![
            record("/dup/a.jpg", 10, "h"),
            record("/dup/b.jpg", 10, "h"),
            record("/other/c.jpg", 10, "h"),
        ];

        let resolution = resolve(scopes, records);

        // The copy outside /dup wins as master, both /dup copies are actionable
        assert_eq!(resolution.groups[0].master.path, Path::new("/other/c.jpg"));
        assert_eq!(resolution.duplicate_count(), 2);

        let scopes = Scopes::new(Some(Path::new("/dup")), None).unwrap();
        let big = record("/other/big.jpg", 10, "h");
        let mut inside = record("/dup/x.jpg", 10, "h");
        inside.modified = at(1);
        let mut outside_late = record("/zzz/y.jpg", 10, "h");
        outside_late.modified = at(2_000_000_000);
        let resolution = resolve(scopes, vec![big, inside, outside_late]);

        assert_eq!(resolution.groups[0].master.path, Path::new("/other/big.jpg"));
        assert_eq!(paths(&resolution.groups[0].duplicates), vec![Path::new("/dup/x.jpg")]);
        assert_eq!(
            resolution.findings,
            vec![Finding {
                master: PathBuf::from("/other/big.jpg"),
                duplicate: PathBuf::from("/zzz/y.jpg"),
                kind: FindingKind::DuplicateOutsideScope,
            }]
        );
    }

    #[test]
    fn duplicate_inside_masters_dir_is_reported() {
        let scopes = Scopes::new(None, Some(Path::new("/A"))).unwrap();
        let mut first = record("/A/first.jpg", 10, "h");
        first.modified = at(1_000);
        let second = record("/A/second.jpg", 10, "h");
        let elsewhere = record("/B/copy.jpg", 10, "h");

        let resolution = resolve(scopes, vec![first, second, elsewhere]);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].master.path, Path::new("/A/first.jpg"));
        assert_eq!(
            paths(&resolution.groups[0].duplicates),
            vec![Path::new("/B/copy.jpg")]
        );
        assert_eq!(resolution.findings.len(), 1);
        assert_eq!(
            resolution.findings[0].kind,
            FindingKind::DuplicateInMastersDir
        );
    }

    #[test]
    fn each_duplicate_belongs_to_one_master() {
        let records = (0..5)
            .map(|i| record(&format!("/photos/{i}.jpg"), 10, "same"))
            .collect();

        let resolution = resolve(Scopes::unrestricted(), records);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].master.path, Path::new("/photos/0.jpg"));
        assert_eq!(resolution.duplicate_count(), 4);
        assert_eq!(resolution.reclaimable_bytes(), 40);
    }

    #[test]
    fn resolve_reads_through_the_store() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("catalog.jsonl")).unwrap();
        store.upsert(record("/photos/a.jpg", 3, "x")).unwrap();
        store.upsert(record("/photos/b.jpg", 3, "x")).unwrap();

        let resolution = DuplicateResolver::new(Scopes::unrestricted())
            .resolve(&store)
            .unwrap();

        assert_eq!(resolution.duplicate_count(), 1);
    }
}
