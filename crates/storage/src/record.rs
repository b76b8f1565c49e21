//! Record framing shared by the WAL, MANIFEST and CHECKPOINT files
//!
//! ## Record Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (not including length itself)
//! - **type**: record type tag
//! - **payload**: bincode-serialized body
//! - **crc32**: CRC32 over \[type\]\[payload\]
//!
//! All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use ndb_core::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// A committed write batch in the WAL.
pub const RECORD_BATCH: u8 = 1;
/// The column family catalog.
pub const RECORD_MANIFEST: u8 = 2;
/// A full image of every column family.
pub const RECORD_CHECKPOINT: u8 = 3;

const LENGTH_SIZE: usize = 4;
const TAG_SIZE: usize = 1;
const CRC_SIZE: usize = 4;

/// Result of decoding one framed record from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A complete, checksum-valid record.
    Record {
        /// Record type tag
        tag: u8,
        /// Payload bytes (without tag and checksum)
        payload: &'a [u8],
        /// Total bytes consumed, length prefix included
        consumed: usize,
    },
    /// The buffer ends in the middle of a record.
    Truncated,
    /// The record is complete but fails validation.
    Corrupt(String),
}

fn checksum(tag: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[tag]);
    hasher.update(payload);
    hasher.finalize()
}

/// Frame `payload` under `tag`.
pub fn encode_record(tag: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = TAG_SIZE + payload.len() + CRC_SIZE;
    let mut buf = Vec::with_capacity(LENGTH_SIZE + total_len);
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.push(tag);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(tag, payload).to_le_bytes());
    buf
}

/// Decode the record at the front of `buf`.
pub fn decode_record(buf: &[u8]) -> Frame<'_> {
    if buf.len() < LENGTH_SIZE {
        return Frame::Truncated;
    }
    let total_len = LittleEndian::read_u32(&buf[..LENGTH_SIZE]) as usize;
    if total_len < TAG_SIZE + CRC_SIZE {
        return Frame::Corrupt(format!("record length {} is too small", total_len));
    }
    if buf.len() < LENGTH_SIZE + total_len {
        return Frame::Truncated;
    }

    let body = &buf[LENGTH_SIZE..LENGTH_SIZE + total_len];
    let tag = body[0];
    let payload = &body[TAG_SIZE..total_len - CRC_SIZE];
    let expected = LittleEndian::read_u32(&body[total_len - CRC_SIZE..]);
    let actual = checksum(tag, payload);
    if expected != actual {
        return Frame::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected, actual
        ));
    }

    Frame::Record {
        tag,
        payload,
        consumed: LENGTH_SIZE + total_len,
    }
}

/// Persist a single framed record atomically (write-fsync-rename).
pub fn write_file_atomic(path: &Path, tag: u8, payload: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&encode_record(tag, payload))?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    // Best effort: make the rename itself durable.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Read a file written by [`write_file_atomic`].
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_file(path: &Path, tag: u8) -> Result<Option<Vec<u8>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match decode_record(&bytes) {
        Frame::Record {
            tag: found,
            payload,
            ..
        } if found == tag => Ok(Some(payload.to_vec())),
        Frame::Record { tag: found, .. } => Err(Error::corruption(format!(
            "{}: unexpected record type {}",
            path.display(),
            found
        ))),
        Frame::Truncated => Err(Error::corruption(format!(
            "{}: truncated record",
            path.display()
        ))),
        Frame::Corrupt(msg) => Err(Error::corruption(format!("{}: {}", path.display(), msg))),
    }
}
