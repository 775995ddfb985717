//! Master selection.

use super::Scopes;
use crate::core::catalog::FileRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Order two candidates so that the better master sorts first.
///
/// Each rule only breaks ties left by the previous one:
/// 1. inside the masters scope
/// 2. outside the duplicates scope
/// 3. larger file (same picture, more embedded metadata)
/// 4. earlier capture date; any date beats none
/// 5. earlier modification time
/// 6. earlier creation time; unknown sorts last
/// 7. smaller path
///
/// Times compare at whole seconds. The last rule makes this a total order,
/// so the master never depends on the order candidates were found in.
pub fn compare(a: &FileRecord, b: &FileRecord, scopes: &Scopes) -> Ordering {
    scopes
        .in_masters(&b.path)
        .cmp(&scopes.in_masters(&a.path))
        .then_with(|| {
            scopes
                .in_duplicates(&a.path)
                .cmp(&scopes.in_duplicates(&b.path))
        })
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| earlier_known(a.capture_date, b.capture_date))
        .then_with(|| a.modified.timestamp().cmp(&b.modified.timestamp()))
        .then_with(|| earlier_known(a.created, b.created))
        .then_with(|| a.path.cmp(&b.path))
}

/// Pick the master among `candidates`
pub fn pick<'a>(
    candidates: impl IntoIterator<Item = &'a FileRecord>,
    scopes: &Scopes,
) -> Option<&'a FileRecord> {
    candidates.into_iter().min_by(|a, b| compare(a, b, scopes))
}

fn earlier_known(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.timestamp().cmp(&b.timestamp()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
