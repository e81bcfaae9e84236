//! Checksum-gated in-memory cache of gzip-compressed response bodies
//!
//! Memoizes the compressed form of a payload per logical key and only
//! re-invokes the external compressor when the payload's hash changes.
//! State is process-local; nothing is persisted.

mod cache;
mod error;

pub use cache::{accepts_gzip, GzipCache};
pub use error::{GzipError, Result};
