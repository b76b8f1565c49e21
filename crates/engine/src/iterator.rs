//! Windowed range scans and write-ahead log tailing
//!
//! [`RangeIterator`] turns a plain store cursor into the paginated,
//! optionally reversed window every collection command needs:
//!
//! 1. Seek to `begin` (forward) or `end` (backward), or to the matching end
//!    of the keyspace when the bound is empty
//! 2. Skip `offset` entries
//! 3. Yield at most `limit` entries (0 = unbounded) while the key stays in
//!    `[begin, end]`
//!
//! [`WalTailer`] follows the store's write-ahead log for replication.

use ndb_core::{Error, Result};
use ndb_storage::{Cursor, Store, WalIterator, WriteBatch};
use std::sync::Arc;

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A bounded, windowed scan over one namespace.
///
/// The iterator is invalid until [`seek`](Self::seek) is called.
pub struct RangeIterator {
    cursor: Cursor,
    direction: Direction,
    begin: Vec<u8>,
    end: Vec<u8>,
    offset: usize,
    limit: usize,
    count: usize,
    in_range: bool,
}

impl RangeIterator {
    pub(crate) fn new(
        cursor: Cursor,
        direction: Direction,
        begin: &[u8],
        end: &[u8],
        offset: usize,
        limit: usize,
    ) -> Self {
        Self {
            cursor,
            direction,
            begin: begin.to_vec(),
            end: end.to_vec(),
            offset,
            limit,
            count: 0,
            in_range: true,
        }
    }

    /// Position on the first entry of the window.
    pub fn seek(&mut self) {
        match self.direction {
            Direction::Forward => {
                if self.begin.is_empty() {
                    self.cursor.seek_to_first();
                } else {
                    self.cursor.seek(&self.begin);
                }
            }
            Direction::Backward => {
                if self.end.is_empty() {
                    self.cursor.seek_to_last();
                } else {
                    self.cursor.seek(&self.end);
                    if !self.cursor.valid() {
                        self.cursor.seek_to_last();
                    } else if self.cursor.key() > self.end.as_slice() {
                        self.cursor.prev();
                    }
                }
            }
        }
        while self.cursor.valid() && self.offset > 0 {
            self.step();
            self.offset -= 1;
        }
        self.count = 1;
        self.check_range();
    }

    /// Move to the next entry of the window.
    pub fn next(&mut self) {
        self.count += 1;
        if self.limit > 0 && self.count > self.limit {
            self.in_range = false;
            return;
        }
        self.step();
        self.check_range();
    }

    /// True while positioned on an entry inside the window.
    pub fn valid(&self) -> bool {
        self.in_range && self.cursor.valid()
    }

    /// Key of the current entry.
    pub fn id(&self) -> &[u8] {
        self.cursor.key()
    }

    /// Raw stored value of the current entry.
    pub fn value(&self) -> &[u8] {
        self.cursor.value()
    }

    /// Sticky error from the underlying cursor.
    pub fn result(&self) -> Result<()> {
        self.cursor.status()
    }

    fn step(&mut self) {
        match self.direction {
            Direction::Forward => self.cursor.next(),
            Direction::Backward => self.cursor.prev(),
        }
    }

    fn check_range(&mut self) {
        if !self.cursor.valid() {
            return;
        }
        let key = self.cursor.key();
        let outside = match self.direction {
            Direction::Forward => !self.end.is_empty() && key > self.end.as_slice(),
            Direction::Backward => !self.begin.is_empty() && key < self.begin.as_slice(),
        };
        if outside {
            self.in_range = false;
        }
    }
}

/// Follows the write-ahead log from a sequence number onwards.
///
/// A replica calls [`seek`](Self::seek) with the sequence it needs next.
/// While the open log iterator still has batches it is advanced in place;
/// once it runs dry or fails, the log is reopened from the requested
/// sequence so newly committed batches become visible.
pub struct WalTailer {
    store: Arc<Store>,
    iter: Option<WalIterator>,
    current: Option<(u64, WriteBatch)>,
    error: Option<String>,
}

impl WalTailer {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            iter: None,
            current: None,
            error: None,
        }
    }

    /// Position on the batch holding `sequence`, or the next one after it.
    pub fn seek(&mut self, sequence: u64) {
        if self.iter.is_some() {
            self.next();
            if self.valid() {
                return;
            }
            self.iter = None;
        }
        self.error = None;
        match self.store.updates_since(sequence) {
            Ok(iter) => {
                self.iter = Some(iter);
                self.next();
            }
            Err(e) => {
                self.current = None;
                self.error = Some(e.to_string());
            }
        }
    }

    /// Advance to the next batch.
    pub fn next(&mut self) {
        self.current = None;
        let Some(iter) = self.iter.as_mut() else {
            return;
        };
        match iter.next() {
            Some(Ok(entry)) => self.current = Some(entry),
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
    }

    pub fn valid(&self) -> bool {
        self.error.is_none() && self.current.is_some()
    }

    /// Sequence of the first op of the current batch.
    pub fn sequence(&self) -> Option<u64> {
        self.current.as_ref().map(|(seq, _)| *seq)
    }

    /// The current batch.
    pub fn batch(&self) -> Option<&WriteBatch> {
        self.current.as_ref().map(|(_, batch)| batch)
    }

    /// Error from the last `seek` or `next`, if any.
    pub fn result(&self) -> Result<()> {
        match &self.error {
            Some(msg) => Err(Error::Storage(msg.clone())),
            None => Ok(()),
        }
    }
}
