//! Collapse entries that share a display name

use ahash::{HashMap, HashMapExt};

use crate::catalog::StableIdentity;
use crate::query::canonical_phrase;

use super::{RankedItem, SearchHit};

/// Something that can be grouped by display name
pub trait NameKeyed {
    fn display_name(&self) -> &str;
    fn identity(&self) -> &StableIdentity;
    /// Ranking score, when one exists
    fn score(&self) -> Option<f32>;
}

impl NameKeyed for SearchHit {
    fn display_name(&self) -> &str {
        &self.record.name
    }

    fn identity(&self) -> &StableIdentity {
        &self.id
    }

    fn score(&self) -> Option<f32> {
        Some(self.semantic_score)
    }
}

impl NameKeyed for RankedItem {
    fn display_name(&self) -> &str {
        &self.hit.record.name
    }

    fn identity(&self) -> &StableIdentity {
        &self.hit.id
    }

    fn score(&self) -> Option<f32> {
        Some(self.fused_score)
    }
}

/// Grouping key: canonical display name, or the identity for blank names
pub fn name_key<T: NameKeyed>(item: &T) -> String {
    let name = canonical_phrase(item.display_name());
    if name.is_empty() {
        format!("id:{}", item.identity())
    } else {
        name
    }
}

/// Keep one item per normalized display name
///
/// Blank names fall back to the stable identity. The highest score wins; on a
/// tie (or without scores) the first-seen item stays. Groups keep the position
/// of their first member.
pub fn dedupe_by_name<T: NameKeyed>(items: Vec<T>) -> Vec<T> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut kept: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        let key = name_key(&item);
        match slots.get(&key) {
            Some(&index) => {
                let better = match (item.score(), kept[index].score()) {
                    (Some(new), Some(old)) => new > old,
                    _ => false,
                };
                if better {
                    kept[index] = item;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(item);
            }
        }
    }

    kept
}
