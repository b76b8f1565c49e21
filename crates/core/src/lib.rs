//! Core types for ndb
//!
//! This crate holds the pieces every other layer agrees on:
//! - Error: the shared error taxonomy (`NotFound`, `Storage`, `Corruption`, ...)
//! - Result: the crate-wide result alias
//! - time: wall-clock helpers used for expiration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::now_ms;
