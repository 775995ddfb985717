//! # Relocator Module
//!
//! Moves confirmed duplicates out of the tree into a destination directory,
//! keeping their directory structure.
//!
//! `/photos/2020/a.jpg` moved to `/quarantine` lands at
//! `/quarantine/photos/2020/a.jpg`, or at `/quarantine/2020/a.jpg` when
//! `/photos` is the prefix to strip.
//!
//! Nothing is ever overwritten: an existing destination aborts the run, and
//! a destination that appears mid-move makes the move fail instead of being
//! replaced. A duplicate that is already gone is skipped, so an interrupted
//! run can simply be repeated. A group whose master is gone keeps all its
//! duplicates. Without `apply`, moves are only planned.

use crate::core::catalog::MetadataStore;
use crate::core::resolver::DuplicateGroup;
use crate::error::RelocateError;
use crate::events::{null_sender, Event, EventSender, RelocateEvent};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

/// What happened to one duplicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MoveStatus {
    /// Dry run; nothing touched
    Planned,
    Moved,
    /// The source was already gone
    MissingSource,
    /// The group's master was gone, so the duplicate was kept
    MissingMaster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
    pub status: MoveStatus,
}

/// Result of a relocation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelocateOutcome {
    pub moves: Vec<PlannedMove>,
}

impl RelocateOutcome {
    /// Whether any file actually moved, i.e. the catalog changed
    pub fn moved_any(&self) -> bool {
        self.count(MoveStatus::Moved) > 0
    }

    pub fn count(&self, status: MoveStatus) -> usize {
        self.moves.iter().filter(|m| m.status == status).count()
    }

    /// Bytes moved out of the tree
    pub fn moved_bytes(&self) -> u64 {
        self.moves
            .iter()
            .filter(|m| m.status == MoveStatus::Moved)
            .map(|m| m.size)
            .sum()
    }
}

/// Moves duplicates under a destination root
pub struct Relocator {
    destination: PathBuf,
    strip_prefix: Option<PathBuf>,
    apply: bool,
}

impl Relocator {
    /// `apply == false` is a dry run
    pub fn new(
        destination: &Path,
        strip_prefix: Option<&Path>,
        apply: bool,
    ) -> Result<Self, RelocateError> {
        Ok(Self {
            destination: absolute(destination)?,
            strip_prefix: strip_prefix.map(absolute).transpose()?,
            apply,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        !self.apply
    }

    /// Relocate every duplicate of every group without events
    pub fn relocate(
        &self,
        groups: &[DuplicateGroup],
        store: &MetadataStore,
    ) -> Result<RelocateOutcome, RelocateError> {
        self.relocate_with_events(groups, store, &null_sender())
    }

    /// Relocate every duplicate, stopping at the first error.
    ///
    /// Moves completed before the error stay done and their records stay
    /// removed from `store`.
    pub fn relocate_with_events(
        &self,
        groups: &[DuplicateGroup],
        store: &MetadataStore,
        events: &EventSender,
    ) -> Result<RelocateOutcome, RelocateError> {
        let mut outcome = RelocateOutcome::default();

        for group in groups {
            if !exists(&group.master.path)? {
                tracing::warn!(
                    "Master {} no longer exists, keeping its {} duplicates",
                    group.master.path.display(),
                    group.duplicates.len()
                );
                events.send(Event::Relocate(RelocateEvent::MissingMaster {
                    master: group.master.path.clone(),
                }));
                for duplicate in &group.duplicates {
                    outcome.moves.push(PlannedMove {
                        source: duplicate.path.clone(),
                        destination: self.destination_for(&duplicate.path)?,
                        size: duplicate.size,
                        status: MoveStatus::MissingMaster,
                    });
                }
                continue;
            }

            for duplicate in &group.duplicates {
                let source = &duplicate.path;
                let destination = self.destination_for(source)?;
                tracing::debug!("Destination path: {}", destination.display());

                let status = self.relocate_one(source, &destination, store)?;
                let event = match status {
                    MoveStatus::Planned => {
                        tracing::info!(
                            "{:>11} Would move {} to {}",
                            duplicate.size,
                            source.display(),
                            destination.display()
                        );
                        RelocateEvent::Planned {
                            source: source.clone(),
                            destination: destination.clone(),
                        }
                    }
                    MoveStatus::Moved => {
                        tracing::info!(
                            "{:>11} Moved {} to {}",
                            duplicate.size,
                            source.display(),
                            destination.display()
                        );
                        RelocateEvent::Moved {
                            source: source.clone(),
                            destination: destination.clone(),
                        }
                    }
                    MoveStatus::MissingSource => {
                        tracing::warn!("File does not exist {}", source.display());
                        RelocateEvent::MissingSource {
                            path: source.clone(),
                        }
                    }
                    MoveStatus::MissingMaster => RelocateEvent::MissingMaster {
                        master: group.master.path.clone(),
                    },
                };
                events.send(Event::Relocate(event));

                outcome.moves.push(PlannedMove {
                    source: source.clone(),
                    destination,
                    size: duplicate.size,
                    status,
                });
            }
        }

        events.send(Event::Relocate(RelocateEvent::Completed {
            moved: outcome.count(MoveStatus::Moved),
            planned: outcome.count(MoveStatus::Planned),
            missing: outcome.count(MoveStatus::MissingSource),
        }));
        Ok(outcome)
    }

    /// Where `source` goes under the destination root
    pub fn destination_for(&self, source: &Path) -> Result<PathBuf, RelocateError> {
        let relative: PathBuf = match &self.strip_prefix {
            Some(prefix) => source
                .strip_prefix(prefix)
                .map_err(|_| RelocateError::OutsideStripPrefix {
                    path: source.to_path_buf(),
                    prefix: prefix.clone(),
                })?
                .to_path_buf(),
            None => source
                .components()
                .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
                .collect(),
        };
        Ok(self.destination.join(relative))
    }

    fn relocate_one(
        &self,
        source: &Path,
        destination: &Path,
        store: &MetadataStore,
    ) -> Result<MoveStatus, RelocateError> {
        match fs::symlink_metadata(source) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MoveStatus::MissingSource),
            Err(e) => return Err(io_error(source, e)),
        }

        match fs::symlink_metadata(destination) {
            Ok(_) => {
                return Err(RelocateError::DestinationExists {
                    source_path: source.to_path_buf(),
                    destination: destination.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(destination, e)),
        }

        if !self.apply {
            return Ok(MoveStatus::Planned);
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        move_file(source, destination)?;
        store.remove(source)?;

        Ok(MoveStatus::Moved)
    }
}

/// Link the destination to the source and unlink the source; when linking
/// is impossible (e.g. across filesystems), copy and delete instead.
///
/// Neither path replaces an existing file: `link` fails on an existing
/// destination and the copy goes into a newly created file. The source is
/// only deleted once the copy has the source's size.
fn move_file(source: &Path, destination: &Path) -> Result<(), RelocateError> {
    let exists_error = || RelocateError::DestinationExists {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
    };

    let link_error = match fs::hard_link(source, destination) {
        Ok(()) => {
            return fs::remove_file(source).map_err(|e| {
                let _ = fs::remove_file(destination);
                io_error(source, e)
            })
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(exists_error()),
        Err(e) => e,
    };
    tracing::debug!(
        "Linking {} failed ({}), copying instead",
        source.display(),
        link_error
    );

    let source_size = fs::metadata(source).map_err(|e| io_error(source, e))?.len();
    let mut input = File::open(source).map_err(|e| io_error(source, e))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => exists_error(),
            _ => io_error(destination, e),
        })?;

    let copied = io::copy(&mut input, &mut output)
        .and_then(|copied| output.sync_all().map(|_| copied))
        .map_err(|e| io_error(destination, e))?;
    drop(output);

    if copied != source_size {
        let _ = fs::remove_file(destination);
        return Err(io_error(
            source,
            io::Error::new(
                io::ErrorKind::Other,
                format!("Copy verification failed: source {source_size} bytes, copied {copied} bytes"),
            ),
        ));
    }

    fs::remove_file(source).map_err(|e| io_error(source, e))
}

/// Whether `path` exists; errors other than "not found" are reported
fn exists(path: &Path) -> Result<bool, RelocateError> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, RelocateError> {
    std::path::absolute(path).map_err(|source| RelocateError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path, source: io::Error) -> RelocateError {
    RelocateError::Io {
        path: path.to_path_buf(),
        source,
    }
}
