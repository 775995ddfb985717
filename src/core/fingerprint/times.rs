//! Filesystem timestamps.

use super::CreationTimeProvider;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// Birth time where the platform records one; on Unix filesystems without
/// it, the inode change time; otherwise the modification time.
pub struct PlatformCreationTime;

impl CreationTimeProvider for PlatformCreationTime {
    fn created(&self, metadata: &Metadata) -> DateTime<Utc> {
        if let Ok(created) = metadata.created() {
            return DateTime::<Utc>::from(created);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
            if let Some(changed) = DateTime::from_timestamp(metadata.ctime(), nanos) {
                return changed;
            }
        }

        to_utc(metadata.modified())
    }
}

/// Convert a filesystem timestamp, falling back to the Unix epoch when the
/// platform cannot report it.
pub fn to_utc(time: io::Result<SystemTime>) -> DateTime<Utc> {
    DateTime::<Utc>::from(time.unwrap_or(UNIX_EPOCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unsupported_timestamp_falls_back_to_epoch() {
        let missing = Err(io::Error::new(io::ErrorKind::Unsupported, "no btime"));
        assert_eq!(to_utc(missing), DateTime::<Utc>::from(UNIX_EPOCH));
    }

    #[test]
    fn creation_time_is_stable_across_reads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"a").unwrap();

        let first = PlatformCreationTime.created(&fs::metadata(&path).unwrap());
        let second = PlatformCreationTime.created(&fs::metadata(&path).unwrap());

        assert_eq!(first, second);
        assert!(first > DateTime::<Utc>::from(UNIX_EPOCH));
    }
}
