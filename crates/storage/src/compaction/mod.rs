//! Compaction passes
//!
//! Deletes in this store take effect immediately, so the only work a pass
//! does is running the family's [`CompactionFilter`](crate::CompactionFilter)
//! over the surviving records and physically removing the ones it rejects.
//!
//! # Algorithm
//!
//! 1. Copy up to `CHUNK` entries of the range under a read lock
//! 2. Release the lock and run the filter on each entry
//! 3. Hand the rejected entries to the store, which removes each one whose
//!    slot sequence is unchanged since step 1
//! 4. Continue after the last key of the chunk
//!
//! Step 3 guarantees a record rewritten while the filter was deciding is
//! never removed on the strength of a stale verdict. The store logs every
//! removal as a WAL delete before applying it, so replay after a crash
//! repeats the removal instead of resurrecting the record from an older
//! checkpoint. WAL consumers see these deletes like any other batch.

pub(crate) mod scheduler;

use crate::family::ColumnFamily;
use crate::filter::{Decision, FilterContext};
use ndb_core::Result;
use std::ops::Bound;
use tracing::trace;

const CHUNK: usize = 1024;

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Records shown to the filter
    pub examined: u64,
    /// Records physically removed
    pub removed: u64,
    /// Rejected records left alone because they changed during the pass
    pub raced: u64,
}

/// Rejected `(key, slot sequence)` pairs of one chunk.
pub(crate) type Victims = Vec<(Vec<u8>, u64)>;

/// Run one pass over `[begin, end]` of `family` (either bound may be open).
///
/// `remove` physically removes the victims of a chunk and returns
/// `(removed, raced)`.
pub(crate) fn compact_family<R>(
    family: &ColumnFamily,
    begin: Option<&[u8]>,
    end: Option<&[u8]>,
    manual: bool,
    mut remove: R,
) -> Result<CompactionStats>
where
    R: FnMut(&ColumnFamily, Victims) -> Result<(u64, u64)>,
{
    let mut stats = CompactionStats::default();
    if let (Some(b), Some(e)) = (begin, end) {
        if b > e {
            return Ok(stats);
        }
    }

    let ctx = FilterContext {
        family: family.name(),
        family_id: family.id(),
        manual,
    };
    let mut filter = match family.filter_factory().and_then(|f| f.create(&ctx)) {
        Some(filter) => filter,
        None => return Ok(stats),
    };
    family.reset_writes();

    let upper = end.map_or(Bound::Unbounded, Bound::Included);
    let mut resume: Option<Vec<u8>> = None;

    loop {
        if family.is_dropped() {
            break;
        }
        let chunk: Vec<(Vec<u8>, Vec<u8>, u64)> = {
            let table = family.table.read();
            let lower = match &resume {
                Some(key) => Bound::Excluded(key.as_slice()),
                None => begin.map_or(Bound::Unbounded, Bound::Included),
            };
            table
                .range::<[u8], _>((lower, upper))
                .take(CHUNK)
                .map(|(k, slot)| (k.clone(), slot.value.clone(), slot.seq))
                .collect()
        };
        let last = match chunk.last() {
            Some((key, _, _)) => key.clone(),
            None => break,
        };

        let mut victims = Vec::new();
        for (key, value, seq) in chunk {
            stats.examined += 1;
            if filter.filter(&key, &value) == Decision::Remove {
                trace!(target: "ndb::compaction", family = family.name(), filter = filter.name(), key = ?key, "removing record");
                victims.push((key, seq));
            }
        }

        if !victims.is_empty() {
            let (removed, raced) = remove(family, victims)?;
            stats.removed += removed;
            stats.raced += raced;
        }
        resume = Some(last);
    }
    Ok(stats)
}
