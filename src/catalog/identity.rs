//! Content-derived identity for catalog records

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::CatalogRecord;

/// Field separator for the hashed tuple; cannot appear in trimmed cell text
const TUPLE_SEPARATOR: &str = "\u{1f}";

/// Deterministic 32-hex-character record id.
///
/// Identical (timestamp, name, primary tags, secondary tags, partner) tuples
/// always hash to the same id, so re-indexing a record overwrites its vector
/// point instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableIdentity(String);

impl StableIdentity {
    /// Accept an id read back from a vector store (hex or hyphenated UUID)
    pub fn parse(raw: &str) -> Option<Self> {
        let hex: String = raw.chars().filter(|c| *c != '-').collect::<String>().to_lowercase();
        (hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UUID rendering for stores that only accept UUID point ids
    pub fn to_uuid(&self) -> Uuid {
        // 32 hex chars always decode to 16 bytes
        Uuid::parse_str(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for StableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the normalized identity tuple of a record with BLAKE3
pub fn stable_identity(record: &CatalogRecord) -> StableIdentity {
    let tuple = [
        &record.timestamp,
        &record.name,
        &record.primary_tags,
        &record.secondary_tags,
        &record.partner,
    ]
    .iter()
    .map(|field| field.trim().to_lowercase())
    .collect::<Vec<_>>()
    .join(TUPLE_SEPARATOR);

    let hash = blake3::hash(tuple.as_bytes());
    StableIdentity(format!("{:.32}", hash.to_hex()))
}
