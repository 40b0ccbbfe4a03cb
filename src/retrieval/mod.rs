//! Hybrid retrieval & ranking
//!
//! Per query: normalize, embed, retrieve nearest neighbors, dedupe by name,
//! fuse semantic and lexical signals, diversify near-duplicate top results,
//! then slice a page.

mod cursor;
mod deduplication;
mod diversify;
mod fusion;
mod hybrid;
mod intents;

pub use cursor::{
    decode_cursor, encode_cursor, paginate, pool_size, Page, PageCursor, PoolSizing,
};
pub use deduplication::{dedupe_by_name, name_key, NameKeyed};
pub use diversify::{jaccard, mmr_reorder, should_diversify, similarity_tokens, DiversifyConfig};
pub use fusion::{fuse_scores, FusionWeights, QueryContext};
pub use hybrid::HybridSearcher;
pub use intents::{AnchorIntent, SynonymFamily, ANCHOR_INTENTS, SYNONYM_FAMILIES};

use crate::catalog::{CatalogRecord, StableIdentity};
use serde::{Deserialize, Serialize};

/// Raw nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: StableIdentity,
    pub record: CatalogRecord,
    /// Cosine similarity in [-1, 1]
    pub semantic_score: f32,
}

/// Per-signal contributions to a fused score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: f32,
    pub primary_tag: f32,
    pub secondary_tag: f32,
    pub free_text: f32,
    pub acronym: f32,
    pub guardrail: f32,
    pub partner: f32,
    pub anchor: f32,
    pub phrase: f32,
    pub synonym: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.semantic
            + self.primary_tag
            + self.secondary_tag
            + self.free_text
            + self.acronym
            + self.guardrail
            + self.partner
            + self.anchor
            + self.phrase
            + self.synonym
    }
}

/// A hit being ranked within one request
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub hit: SearchHit,
    pub fused_score: f32,
    pub breakdown: ScoreBreakdown,
}

impl RankedItem {
    /// Start from the semantic score alone
    pub fn new(hit: SearchHit) -> Self {
        let breakdown = ScoreBreakdown {
            semantic: hit.semantic_score,
            ..Default::default()
        };
        Self {
            fused_score: hit.semantic_score,
            hit,
            breakdown,
        }
    }
}

/// Search query with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Page size
    pub limit: usize,

    /// Opaque cursor from a previous page
    pub cursor: Option<String>,

    /// Keep only records carrying this tag (primary or secondary)
    pub tag_filter: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            cursor: None,
            tag_filter: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag_filter = tag;
        self
    }
}

/// One ranked record returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: StableIdentity,
    pub score: f32,
    pub record: CatalogRecord,
    pub breakdown: ScoreBreakdown,
}

impl From<RankedItem> for SearchResult {
    fn from(item: RankedItem) -> Self {
        Self {
            id: item.hit.id,
            score: item.fused_score,
            record: item.hit.record,
            breakdown: item.breakdown,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage {
    pub items: Vec<SearchResult>,
    pub next_cursor: Option<String>,
    /// Size of the deduplicated, filtered pool retrieved for this page.
    ///
    /// Counts the records served by earlier pool segments plus the current
    /// segment. The pool grows along a walk and is capped, so this is not a
    /// corpus-wide count; on the last page it equals the number of records
    /// the whole walk returned.
    pub total_estimate: usize,
}
