//! The value envelope stored under every meta key
//!
//! A value is either a scalar (`int64` or raw bytes) or the root record of a
//! collection ([`Meta`]). Either may carry an absolute expiry time in
//! milliseconds since the Unix epoch.
//!
//! # Deletion
//!
//! A record is logically deleted when its meta is flagged `deleted` or its
//! expiry has passed. [`Value::decode`] treats both the same way: it returns
//! [`Error::NotFound`], and for a collection it keeps the type and advances
//! the version by one. The next write therefore starts a fresh generation
//! and the members of the old one become garbage for the compaction filter.
//!
//! # Encoding
//!
//! Values are MessagePack (`rmp-serde`).

use ndb_core::{now_ms, Error, Result};
use serde::{Deserialize, Serialize};

/// Collection type codes used in member-key prefixes.
///
/// `None` (code 0) is never stored as a real type; it is the smallest
/// possible type byte and marks the start of a generation's member range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Not a collection
    #[default]
    None = 0,
    /// Unordered set
    Set = 1,
    /// Ordered set
    OSet = 2,
    /// Sorted set
    ZSet = 3,
    /// List
    List = 4,
    /// Hash
    Hash = 5,
}

/// Subtype of sorted-set members keyed by member.
pub const ZSET_BY_MEMBER: u8 = 1;
/// Subtype of sorted-set members keyed by score.
pub const ZSET_BY_SCORE: u8 = 2;
/// Subtype for every type with a single member layout.
pub const DEFAULT_SUBTYPE: u8 = 1;

impl DataType {
    /// Type code used in member keys.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`DataType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DataType::None),
            1 => Some(DataType::Set),
            2 => Some(DataType::OSet),
            3 => Some(DataType::ZSet),
            4 => Some(DataType::List),
            5 => Some(DataType::Hash),
            _ => None,
        }
    }

    /// Name reported to clients.
    pub fn name(self) -> &'static str {
        match self {
            DataType::None => "none",
            DataType::Set => "set",
            DataType::OSet => "oset",
            DataType::ZSet => "zset",
            DataType::List => "list",
            DataType::Hash => "hash",
        }
    }
}

/// Which end of a collection is evicted once it grows past `maxlen`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pruning {
    /// Evict the lowest-ranked entries
    #[default]
    Min,
    /// Evict the highest-ranked entries
    Max,
}

impl Pruning {
    pub fn name(self) -> &'static str {
        match self {
            Pruning::Min => "min",
            Pruning::Max => "max",
        }
    }
}

/// Root record of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub kind: DataType,
    /// Generation counter; members of older generations are garbage.
    pub version: u64,
    /// Number of members in the current generation.
    pub length: u64,
    pub maxlen: Option<u64>,
    pub pruning: Pruning,
    pub deleted: bool,
}

impl Meta {
    /// A fresh, empty collection of `kind`.
    pub fn new(kind: DataType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Namespace-level defaults applied to new records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configs {
    /// Relative time to live in milliseconds.
    pub expire: Option<u64>,
    pub maxlen: Option<u64>,
    pub pruning: Option<Pruning>,
}

impl Configs {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Body {
    Int64(i64),
    Bytes(Vec<u8>),
    Meta(Meta),
}

/// A scalar or collection root plus an optional expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    body: Option<Body>,
    expire: Option<i64>,
}

impl Value {
    pub fn from_int64(i: i64) -> Self {
        Self {
            body: Some(Body::Int64(i)),
            expire: None,
        }
    }

    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(Body::Bytes(b.into())),
            expire: None,
        }
    }

    pub fn from_meta(meta: Meta) -> Self {
        Self {
            body: Some(Body::Meta(meta)),
            expire: None,
        }
    }

    pub fn int64(&self) -> Option<i64> {
        match &self.body {
            Some(Body::Int64(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Some(Body::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn meta(&self) -> Option<&Meta> {
        match &self.body {
            Some(Body::Meta(m)) => Some(m),
            _ => None,
        }
    }

    pub fn meta_mut(&mut self) -> Option<&mut Meta> {
        match &mut self.body {
            Some(Body::Meta(m)) => Some(m),
            _ => None,
        }
    }

    pub fn has_meta(&self) -> bool {
        self.meta().is_some()
    }

    /// True when the value holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Absolute expiry in milliseconds since the Unix epoch.
    pub fn expire(&self) -> Option<i64> {
        self.expire
    }

    pub fn set_expire(&mut self, expire: Option<i64>) {
        self.expire = expire;
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Parse `data` without looking at deletion or expiry.
    pub fn decode_raw(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }

    /// Replace `self` with the record in `data`.
    ///
    /// A deleted or expired record yields [`Error::NotFound`] and leaves
    /// `self` empty, except that a collection keeps its type and moves on to
    /// the next version.
    pub fn decode(&mut self, data: &[u8]) -> Result<()> {
        *self = Self::decode_raw(data)?;
        if !self.is_deleted() {
            return Ok(());
        }
        *self = match self.meta() {
            Some(meta) => Value::from_meta(Meta {
                version: meta.version.saturating_add(1),
                ..Meta::new(meta.kind)
            }),
            None => Value::default(),
        };
        Err(Error::NotFound)
    }

    /// Deleted flag set, or expiry in the past.
    pub fn is_deleted(&self) -> bool {
        if self.meta().is_some_and(|m| m.deleted) {
            return true;
        }
        matches!(self.expire, Some(expire) if expire < now_ms())
    }

    /// Record the member count. Zero tombstones the collection.
    ///
    /// A positive length leaves an existing `deleted` flag alone. No effect
    /// on scalars.
    pub fn set_length(&mut self, length: u64) {
        if let Some(meta) = self.meta_mut() {
            meta.length = length;
            if length == 0 {
                meta.deleted = true;
            }
        }
    }

    /// Apply namespace defaults.
    ///
    /// The expiry is filled in only when the record has none. `maxlen` and
    /// `pruning` are overwritten whenever `configs` carries them, so a
    /// second call with per-request overrides takes precedence.
    pub fn set_configs(&mut self, configs: &Configs) {
        if self.expire.is_none() {
            if let Some(ttl) = configs.expire {
                let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
                self.expire = Some(now_ms().saturating_add(ttl));
            }
        }
        if let Some(meta) = self.meta_mut() {
            if let Some(maxlen) = configs.maxlen {
                meta.maxlen = Some(maxlen);
            }
            if let Some(pruning) = configs.pruning {
                meta.pruning = pruning;
            }
        }
    }

    /// Rank range `[start, stop]` to evict when the collection has grown to
    /// at least 110% of its `maxlen`.
    pub fn exceed_maxlen(&self) -> Option<(u64, u64)> {
        let meta = self.meta()?;
        let maxlen = meta.maxlen?;
        let length = meta.length;
        if length == 0 || u128::from(length) * 10 < u128::from(maxlen) * 11 {
            return None;
        }
        match meta.pruning {
            Pruning::Min => Some((0, length - maxlen - 1)),
            Pruning::Max => Some((maxlen, length - 1)),
        }
    }
}

/// Type name reported to clients.
pub fn type_name(value: &Value) -> &'static str {
    if value.is_deleted() {
        return "none";
    }
    match &value.body {
        Some(Body::Int64(_)) => "int",
        Some(Body::Bytes(_)) => "string",
        Some(Body::Meta(meta)) if meta.kind != DataType::None => meta.kind.name(),
        _ => "unknown",
    }
}
