//! Cache record and duration types

use datestamp::Unit;
use std::fmt;

/// One TTL-cached item as materialized on disk.
///
/// `created_at` and `duration` are the raw tokens lifted out of the
/// filename prefix; either may be empty when the prefix did not parse
/// (see [`crate::TtlFileCache`] on lenient vs strict mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub filename: String,
    pub created_at: String,
    pub duration: String,
}

/// Result of an expiration check
#[derive(Debug, Clone)]
pub struct Expiration {
    pub expired: bool,
    pub record: Option<CacheRecord>,
}

/// Parsed duration token: `30D`, `6M`, `1Y`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSpec {
    pub limit: i64,
    pub unit: Unit,
}

impl DurationSpec {
    /// Parse a `<integer><D|M|Y>` token
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let unit = Unit::from_letter(chars.next_back()?)?;
        let limit: i64 = chars.as_str().parse().ok()?;
        Some(Self { limit, unit })
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.limit, self.unit.letter())
    }
}
