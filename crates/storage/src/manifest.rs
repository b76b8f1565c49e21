//! MANIFEST and CHECKPOINT files
//!
//! The MANIFEST is the catalog of column families. The CHECKPOINT is a full
//! image of every family at one sequence number; WAL replay starts after it.
//! Both are single framed records persisted with write-fsync-rename.

use crate::record::{read_file, write_file_atomic, RECORD_CHECKPOINT, RECORD_MANIFEST};
use crate::options::DEFAULT_COLUMN_FAMILY;
use ndb_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const MANIFEST_FILE: &str = "MANIFEST";
pub(crate) const CHECKPOINT_FILE: &str = "CHECKPOINT";

/// Column family catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub(crate) next_family_id: u32,
    pub(crate) families: Vec<(u32, String)>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            next_family_id: 1,
            families: vec![(0, DEFAULT_COLUMN_FAMILY.to_string())],
        }
    }
}

impl Manifest {
    pub(crate) fn load(dir: &Path) -> Result<Option<Self>> {
        match read_file(&dir.join(MANIFEST_FILE), RECORD_MANIFEST)? {
            Some(payload) => Ok(Some(bincode::deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn store(&self, dir: &Path) -> Result<()> {
        let payload = bincode::serialize(self)?;
        write_file_atomic(&dir.join(MANIFEST_FILE), RECORD_MANIFEST, &payload)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.families.iter().any(|(_, n)| n == name)
    }

    /// Register `name`, returning its new id.
    pub(crate) fn add(&mut self, name: &str) -> u32 {
        let id = self.next_family_id;
        self.next_family_id += 1;
        self.families.push((id, name.to_string()));
        id
    }

    pub(crate) fn remove(&mut self, id: u32) {
        self.families.retain(|(fid, _)| *fid != id);
    }
}

/// Contents of one column family inside a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FamilyImage {
    pub(crate) id: u32,
    pub(crate) entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Full image of the store at `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Checkpoint {
    pub(crate) sequence: u64,
    /// First WAL segment not covered by this checkpoint.
    pub(crate) first_live_segment: u64,
    pub(crate) families: Vec<FamilyImage>,
}

impl Checkpoint {
    pub(crate) fn load(dir: &Path) -> Result<Option<Self>> {
        match read_file(&dir.join(CHECKPOINT_FILE), RECORD_CHECKPOINT)? {
            Some(payload) => Ok(Some(bincode::deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn store(&self, dir: &Path) -> Result<()> {
        let payload = bincode::serialize(self)?;
        write_file_atomic(&dir.join(CHECKPOINT_FILE), RECORD_CHECKPOINT, &payload)
    }
}
