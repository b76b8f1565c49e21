//! Error types for ndb
//!
//! A single taxonomy is shared by the storage substrate and the engine so
//! that a failure can travel from the disk up to a command handler without
//! being re-wrapped at every layer. We use `thiserror` for the `Display` and
//! `Error` implementations.
//!
//! `NotFound` is deliberately uninformative: callers cannot tell a key that
//! was never written from one that was deleted or has expired.

use std::io;
use thiserror::Error;

/// Result type alias for ndb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ndb
#[derive(Debug, Error)]
pub enum Error {
    /// The record does not exist, is tombstoned, or has expired.
    #[error("not found")]
    NotFound,

    /// Failure reported by the storage substrate.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed bytes were read back from storage.
    #[error("corruption: {0}")]
    Corruption(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller passed something the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// True for [`Error::Corruption`].
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// Shorthand for building a [`Error::Storage`].
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Shorthand for building a [`Error::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Corruption(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::storage("disk full").is_not_found());
    }

    #[test]
    fn test_error_display_storage() {
        let msg = Error::storage("disk full").to_string();
        assert!(msg.contains("storage error"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::corruption("truncated varint");
        assert!(err.is_corruption());
        assert!(err.to_string().contains("truncated varint"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing segment");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_rmp_decode_error_is_corruption() {
        let bad: std::result::Result<String, _> = rmp_serde::from_slice(&[0xc1]);
        let err: Error = bad.unwrap_err().into();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_bincode_error_conversion() {
        let bad: std::result::Result<String, _> = bincode::deserialize(&[0xff]);
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
