//! # Catalog Module
//!
//! The content-addressed record of every file we have fingerprinted.
//!
//! ## Layout
//! - `index` - in-memory primary (`path -> record`) and digest indices
//! - `log` - the append-only, newline-delimited JSON file behind the index
//! - `store` - `MetadataStore`, which keeps the two in step behind one lock
//!
//! ## Durability
//! Every mutation is appended to the log as one JSON line. Replaying the log
//! with "last write for a path wins" rebuilds the index. Compaction rewrites
//! the log with exactly one line per live path and keeps the old log as a
//! `<log>.<hex-unix-seconds>` backup.

mod index;
mod log;
mod store;

pub use index::CatalogIndex;
pub use log::CatalogLog;
pub use store::{Freshness, LoadOptions, LoadReport, LoadStrategy, MetadataStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything we know about one file.
///
/// Records are only ever replaced whole; there are no partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path, the unique key of the record
    #[serde(rename = "Path")]
    pub path: PathBuf,
    /// File length in bytes at scan time
    #[serde(rename = "Size")]
    pub size: u64,
    /// Hex digest of the whole file
    #[serde(rename = "FileHash")]
    pub content_hash: String,
    /// Hex digest of the decoded, canonically re-encoded image
    #[serde(rename = "ImageHash", default, with = "optional_digest")]
    pub bitmap_hash: Option<String>,
    /// Creation time at scan time; absent in entries written before it was tracked
    #[serde(rename = "Created", default, with = "optional_time")]
    pub created: Option<DateTime<Utc>>,
    /// Modification time at scan time
    #[serde(rename = "Modified")]
    pub modified: DateTime<Utc>,
    /// When the photo or video was actually taken
    #[serde(rename = "DateShot", default, with = "optional_time")]
    pub capture_date: Option<DateTime<Utc>>,
}

/// The live filesystem facts a record is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FileRecord {
    /// A record is fresh when size and both timestamps still match the live
    /// file and a content hash was recorded.
    pub fn is_fresh(&self, stat: &FileStat) -> bool {
        self.size == stat.size
            && self.created == Some(stat.created)
            && self.modified == stat.modified
            && !self.content_hash.is_empty()
    }

    /// Digests this record is indexed under: the content hash, then the
    /// bitmap hash when there is one.
    pub fn digests(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.content_hash.as_str()).chain(self.bitmap_hash.as_deref())
    }

    /// Whether both records have byte-identical content
    pub fn same_content(&self, other: &FileRecord) -> bool {
        self.content_hash == other.content_hash
    }
}

/// Image hashes are written as `""` when absent.
mod optional_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.filter(|digest| !digest.is_empty()))
    }
}

/// Optional timestamps are written as the zero time when absent; `""`,
/// `null` and the zero time all read back as absent.
mod optional_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => {
                let time = DateTime::parse_from_rfc3339(text)
                    .map_err(D::Error::custom)?
                    .with_timezone(&Utc);
                Ok((time.year() > 1).then_some(time))
            }
        }
    }
}
