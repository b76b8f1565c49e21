//! Key layouts for scalars, collection roots and collection members
//!
//! ```text
//! meta key:    id 0x00
//! member key:  id 0x00 varint(version) (type << 3 | subtype) suffix
//! ```
//!
//! The trailing NUL of a meta key makes it sort immediately before every
//! member key of the same id. Everything after the prefix is owned by the
//! collection type: raw field bytes for hashes and sets, fixed-width
//! integers for list indexes, scores and ordered-set fields.
//!
//! Every encoding here is order-preserving: comparing the encoded bytes
//! gives the same answer as comparing the decoded values.
//!
//! Decoders take `&mut &[u8]` and advance it past what they consumed. They
//! return `None` on truncated or malformed input and leave the slice
//! untouched in that case.

use byteorder::{BigEndian, ByteOrder};

/// Terminator appended to an id to form its meta key.
pub const META_SEPARATOR: u8 = 0x00;

/// Largest value `encode_prefix` accepts for the type field.
pub const MAX_TYPE: u8 = (1 << 5) - 1;

/// Largest value `encode_prefix` accepts for the subtype field.
pub const MAX_SUBTYPE: u8 = (1 << 3) - 1;

const SIGN_BIT: u64 = 1 << 63;

/// First tag byte of a multi-byte varint. Values below it encode as themselves.
const VARINT_SINGLE_LIMIT: u8 = 0xF8;

/// Append the terminator to `id`.
pub fn encode_meta(id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.len() + 1);
    key.extend_from_slice(id);
    key.push(META_SEPARATOR);
    key
}

/// Split off everything up to and including the first NUL.
pub fn decode_meta<'a>(src: &mut &'a [u8]) -> Option<&'a [u8]> {
    let pos = src.iter().position(|&b| b == META_SEPARATOR)?;
    let (meta, rest) = src.split_at(pos + 1);
    *src = rest;
    Some(meta)
}

/// Append `u` as 8 big-endian bytes.
pub fn encode_uint64(dst: &mut Vec<u8>, u: u64) {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, u);
    dst.extend_from_slice(&buf);
}

pub fn decode_uint64(src: &mut &[u8]) -> Option<u64> {
    if src.len() < 8 {
        return None;
    }
    let u = BigEndian::read_u64(&src[..8]);
    *src = &src[8..];
    Some(u)
}

/// Append `i` as 8 big-endian bytes with the sign bit flipped, so negative
/// numbers sort before positive ones.
pub fn encode_int64(dst: &mut Vec<u8>, i: i64) {
    encode_uint64(dst, (i as u64) ^ SIGN_BIT);
}

pub fn decode_int64(src: &mut &[u8]) -> Option<i64> {
    decode_uint64(src).map(|u| (u ^ SIGN_BIT) as i64)
}

/// Append `v` as an order-preserving varint.
///
/// Values below `0xF8` take one byte. Larger values take a tag byte
/// `0xF7 + n` followed by the minimal `n`-byte big-endian representation,
/// so a longer encoding always starts with a larger tag.
pub fn encode_varint(dst: &mut Vec<u8>, v: u64) {
    if v < u64::from(VARINT_SINGLE_LIMIT) {
        dst.push(v as u8);
        return;
    }
    let n = 8 - (v.leading_zeros() / 8) as usize;
    dst.push(VARINT_SINGLE_LIMIT - 1 + n as u8);
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, v);
    dst.extend_from_slice(&buf[8 - n..]);
}

/// Inverse of [`encode_varint`]. Rejects truncated and non-minimal input.
pub fn decode_varint(src: &mut &[u8]) -> Option<u64> {
    let (&tag, rest) = src.split_first()?;
    if tag < VARINT_SINGLE_LIMIT {
        *src = rest;
        return Some(u64::from(tag));
    }
    let n = usize::from(tag - (VARINT_SINGLE_LIMIT - 1));
    if rest.len() < n || rest[0] == 0 {
        return None;
    }
    let v = rest[..n]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    if n == 1 && v < u64::from(VARINT_SINGLE_LIMIT) {
        return None;
    }
    *src = &rest[n..];
    Some(v)
}

/// The decoded prefix of a member key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix<'a> {
    /// Meta key of the owning collection, terminator included
    pub meta_key: &'a [u8],
    /// Collection generation the member belongs to
    pub version: u64,
    /// Collection type code
    pub kind: u8,
    /// Type-specific layout selector
    pub subtype: u8,
}

/// Build the member-key prefix shared by every member of one collection
/// generation.
///
/// `kind` must be at most [`MAX_TYPE`] and `subtype` at most
/// [`MAX_SUBTYPE`]; out-of-range bits are masked off.
pub fn encode_prefix(meta_key: &[u8], version: u64, kind: u8, subtype: u8) -> Vec<u8> {
    debug_assert!(kind <= MAX_TYPE && subtype <= MAX_SUBTYPE);
    let mut key = Vec::with_capacity(meta_key.len() + 10);
    key.extend_from_slice(meta_key);
    encode_varint(&mut key, version);
    key.push(((kind & MAX_TYPE) << 3) | (subtype & MAX_SUBTYPE));
    key
}

/// Parse a member-key prefix, returning it with the type-specific suffix.
pub fn decode_prefix(key: &[u8]) -> Option<(Prefix<'_>, &[u8])> {
    let mut rest = key;
    let meta_key = decode_meta(&mut rest)?;
    let version = decode_varint(&mut rest)?;
    let (&type_byte, suffix) = rest.split_first()?;
    let prefix = Prefix {
        meta_key,
        version,
        kind: type_byte >> 3,
        subtype: type_byte & MAX_SUBTYPE,
    };
    Some((prefix, suffix))
}

/// Strip a member key down to its type-specific suffix.
pub fn remove_prefix(key: &[u8]) -> Option<&[u8]> {
    decode_prefix(key).map(|(_, suffix)| suffix)
}
