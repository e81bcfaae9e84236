//! Disk cache with TTL expiration encoded entirely in filenames
//!
//! Each cached item is one file named
//! `<epochMillis><+|-><tzHours>_<N><D|M|Y>.<namespace>.<logicalName>`;
//! the directory listing is the only index, so the cache survives process
//! restarts with no recovery step. Expiration uses calendar-unit
//! differences (a `1M` entry tracks real month lengths, not 30x24h).

mod cache;
mod error;
mod types;

pub use cache::TtlFileCache;
pub use error::{CacheError, Result};
pub use types::{CacheRecord, DurationSpec, Expiration};
