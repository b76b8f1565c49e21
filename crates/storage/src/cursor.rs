//! Ordered cursor over one column family

use crate::family::{ColumnFamily, Slot, Table};
use ndb_core::{Error, Result};
use std::ops::Bound;
use std::sync::Arc;

/// A bidirectional cursor.
///
/// Every positioning call re-reads the live table, so a cursor always
/// observes the latest committed state rather than a snapshot. A cursor is
/// invalid until it is positioned.
pub struct Cursor {
    family: Arc<ColumnFamily>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    error: Option<String>,
}

impl Cursor {
    pub(crate) fn new(family: Arc<ColumnFamily>) -> Self {
        Self {
            family,
            current: None,
            error: None,
        }
    }

    fn position<F>(&mut self, locate: F)
    where
        F: for<'a> FnOnce(&'a Table) -> Option<(&'a Vec<u8>, &'a Slot)>,
    {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.family.ensure_live() {
            self.error = Some(e.to_string());
            self.current = None;
            return;
        }
        let table = self.family.table.read();
        self.current = locate(&table).map(|(k, slot)| (k.clone(), slot.value.clone()));
    }

    /// Position at the first key.
    pub fn seek_to_first(&mut self) {
        self.position(|t| t.iter().next());
    }

    /// Position at the last key.
    pub fn seek_to_last(&mut self) {
        self.position(|t| t.iter().next_back());
    }

    /// Position at the first key `>= target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.position(|t| {
            t.range::<[u8], _>((Bound::Included(target), Bound::Unbounded))
                .next()
        });
    }

    /// Advance to the next key. No-op on an invalid cursor.
    pub fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.position(|t| {
                t.range::<[u8], _>((Bound::Excluded(key.as_slice()), Bound::Unbounded))
                    .next()
            });
        }
    }

    /// Step back to the previous key. No-op on an invalid cursor.
    pub fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.position(|t| {
                t.range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_slice())))
                    .next_back()
            });
        }
    }

    /// True when positioned on an entry and no error occurred.
    pub fn valid(&self) -> bool {
        self.error.is_none() && self.current.is_some()
    }

    /// Current key (empty when invalid).
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(k, _)| k.as_slice())
    }

    /// Current value (empty when invalid).
    pub fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, v)| v.as_slice())
    }

    /// Sticky error, if any positioning call failed.
    pub fn status(&self) -> Result<()> {
        match &self.error {
            Some(msg) => Err(Error::Storage(msg.clone())),
            None => Ok(()),
        }
    }
}
