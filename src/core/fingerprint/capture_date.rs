//! Capture date extraction.
//!
//! ## Sources, in order
//! - EXIF `DateTimeOriginal`, then `DateTimeDigitized`, then `DateTime`
//! - For QuickTime/MP4 containers, the `moov/mvhd` creation time
//!
//! EXIF timestamps carry no zone; they are read as UTC.

use super::CaptureDateExtractor;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Seconds between 1904-01-01 (QuickTime epoch) and 1970-01-01
const QUICKTIME_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Extensions whose files are searched for a `mvhd` atom
const QUICKTIME_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "3gp"];

/// EXIF first, QuickTime atoms as a fallback for movie files.
pub struct MediaDateExtractor;

impl CaptureDateExtractor for MediaDateExtractor {
    fn capture_date(&self, path: &Path) -> Option<DateTime<Utc>> {
        if let Some(date) = exif_date(path) {
            return Some(date);
        }

        if is_quicktime(path) {
            let file = File::open(path).ok()?;
            let len = file.metadata().ok()?.len();
            tracing::trace!("Reading moov {}", path.display());
            return quicktime_creation_time(&mut BufReader::new(file), len);
        }

        None
    }
}

fn is_quicktime(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| QUICKTIME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn exif_date(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(&file);
    let exif_reader = Reader::new().read_from_container(&mut bufreader).ok()?;

    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif_reader.get_field(tag, In::PRIMARY))
        .find_map(|field| parse_exif_datetime(&field.value))
}

/// EXIF date format: "YYYY:MM:DD HH:MM:SS", NUL padded
fn parse_exif_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let Value::Ascii(ref vec) = value else {
        return None;
    };
    let text = std::str::from_utf8(vec.first()?).ok()?;
    let naive =
        NaiveDateTime::parse_from_str(text.trim_end_matches('\0').trim(), "%Y:%m:%d %H:%M:%S")
            .ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Creation time from the `mvhd` atom inside `moov`.
///
/// `len` is the number of bytes available from the reader's current
/// position. A zero creation time counts as unknown.
pub fn quicktime_creation_time<R: Read + Seek>(reader: &mut R, len: u64) -> Option<DateTime<Utc>> {
    let moov_len = find_atom(reader, len, b"moov")?;
    let mvhd_len = find_atom(reader, moov_len, b"mvhd")?;

    let mut version_and_flags = [0u8; 4];
    reader.read_exact(&mut version_and_flags).ok()?;

    let seconds = match version_and_flags[0] {
        0 if mvhd_len >= 8 => {
            let mut raw = [0u8; 4];
            reader.read_exact(&mut raw).ok()?;
            u32::from_be_bytes(raw) as i64
        }
        1 if mvhd_len >= 12 => {
            let mut raw = [0u8; 8];
            reader.read_exact(&mut raw).ok()?;
            i64::try_from(u64::from_be_bytes(raw)).ok()?
        }
        _ => return None,
    };

    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(seconds - QUICKTIME_EPOCH_OFFSET, 0).single()
}

/// Skip sibling atoms until one of type `kind`; leaves the reader at its
/// payload and returns the payload length.
fn find_atom<R: Read + Seek>(reader: &mut R, mut remaining: u64, kind: &[u8; 4]) -> Option<u64> {
    while remaining >= 8 {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header).ok()?;

        let mut size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let mut header_len = 8;
        if size == 1 {
            let mut extended = [0u8; 8];
            reader.read_exact(&mut extended).ok()?;
            size = u64::from_be_bytes(extended);
            header_len = 16;
        } else if size == 0 {
            // Atom runs to the end of its parent
            size = remaining;
        }

        if size < header_len || size > remaining {
            return None;
        }

        let payload = size - header_len;
        if &header[4..8] == kind {
            return Some(payload);
        }

        reader
            .seek(SeekFrom::Current(i64::try_from(payload).ok()?))
            .ok()?;
        remaining -= size;
    }
    None
}
