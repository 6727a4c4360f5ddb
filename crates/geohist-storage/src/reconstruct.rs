//! Point-in-time reconstruction.
//!
//! A history and a set of query timestamps are merged in one pass: both are
//! walked newest to oldest, and each query timestamp is assigned the newest
//! version whose timestamp is not after it. Snapshots (one timestamp) and
//! time series (many) use the same merge.

use std::collections::BTreeMap;

use geohist_entity::{Timestamp, Version, VersionedEntity};

/// Project a newest-first history onto `queries`.
///
/// Timestamps older than the oldest version are absent from the result.
/// Duplicate query timestamps collapse. Runs in
/// `O(|history| + |queries| log |queries|)`, the log factor being the sort.
pub fn reconstruct<'v, I>(newest_first: I, queries: &[Timestamp]) -> BTreeMap<Timestamp, &'v Version>
where
    I: IntoIterator<Item = &'v Version>,
{
    let mut sorted = queries.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    let mut assigned = BTreeMap::new();
    let mut cursor = sorted.iter().copied().peekable();
    for version in newest_first {
        while let Some(at) = cursor.next_if(|&at| at >= version.timestamp) {
            assigned.insert(at, version);
        }
        if cursor.peek().is_none() {
            break;
        }
    }
    assigned
}

/// The version of `entity` in effect at `at`, deleted or not.
#[must_use]
pub fn version_at(entity: &VersionedEntity, at: Timestamp) -> Option<&Version> {
    entity.newest_first().find(|version| version.timestamp <= at)
}
