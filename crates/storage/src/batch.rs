//! Atomic multi-operation write batches

use crate::family::ColumnFamily;
use ndb_core::Result;
use serde::{Deserialize, Serialize};

/// Fixed overhead of an empty batch (sequence + count).
const BATCH_HEADER_SIZE: usize = 12;
/// Per-op overhead: tag, column family id, key length.
const OP_HEADER_SIZE: usize = 1 + 4 + 4;
/// Extra overhead for a put: value length.
const VALUE_HEADER_SIZE: usize = 4;

/// One operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Insert or overwrite `key`.
    Put {
        /// Column family id
        cf: u32,
        /// Key bytes
        key: Vec<u8>,
        /// Value bytes
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Column family id
        cf: u32,
        /// Key bytes
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Column family this op targets.
    pub fn cf(&self) -> u32 {
        match self {
            BatchOp::Put { cf, .. } | BatchOp::Delete { cf, .. } => *cf,
        }
    }

    /// Key this op targets.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key, .. } => key,
        }
    }
}

/// A group of puts and deletes committed as one indivisible write.
///
/// Operations may target several column families. Each op consumes one
/// sequence number at commit time; the batch is identified by the sequence
/// of its first op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    data_size: usize,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            data_size: BATCH_HEADER_SIZE,
        }
    }
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put of `key` into `family`.
    pub fn put(&mut self, family: &ColumnFamily, key: &[u8], value: &[u8]) {
        self.data_size += OP_HEADER_SIZE + VALUE_HEADER_SIZE + key.len() + value.len();
        self.ops.push(BatchOp::Put {
            cf: family.id(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queue a delete of `key` from `family`.
    pub fn delete(&mut self, family: &ColumnFamily, key: &[u8]) {
        self.data_size += OP_HEADER_SIZE + key.len();
        self.ops.push(BatchOp::Delete {
            cf: family.id(),
            key: key.to_vec(),
        });
    }

    /// Operations in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations in order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if no operations are queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Approximate serialized size of the batch in bytes.
    ///
    /// Bulk loaders use this to decide when to commit and start a new batch.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Drop all queued operations.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.data_size = BATCH_HEADER_SIZE;
    }

    /// Serialize the batch (the form handed to WAL consumers).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse a batch produced by [`WriteBatch::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(id: u32) -> ColumnFamily {
        ColumnFamily::new(id, format!("cf{}", id), None)
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.data_size(), BATCH_HEADER_SIZE);
    }

    #[test]
    fn test_data_size_grows_with_ops() {
        let cf = family(1);
        let mut batch = WriteBatch::new();
        batch.put(&cf, b"key", b"value");
        let after_put = batch.data_size();
        assert_eq!(after_put, BATCH_HEADER_SIZE + 9 + 4 + 3 + 5);

        batch.delete(&cf, b"key");
        assert_eq!(batch.data_size(), after_put + 9 + 3);
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.data_size(), BATCH_HEADER_SIZE);
    }

    #[test]
    fn test_ops_keep_family_and_order() {
        let a = family(1);
        let b = family(2);
        let mut batch = WriteBatch::new();
        batch.put(&a, b"x", b"1");
        batch.delete(&b, b"y");

        assert_eq!(batch.ops()[0].cf(), 1);
        assert_eq!(batch.ops()[0].key(), b"x");
        assert_eq!(batch.ops()[1].cf(), 2);
        assert!(matches!(batch.ops()[1], BatchOp::Delete { .. }));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let cf = family(3);
        let mut batch = WriteBatch::new();
        batch.put(&cf, b"k", b"v");
        let bytes = batch.to_bytes().unwrap();
        assert_eq!(WriteBatch::from_bytes(&bytes).unwrap(), batch);
    }
}
