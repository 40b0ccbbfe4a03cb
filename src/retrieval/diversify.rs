//! MMR diversification of near-duplicate top results

use std::collections::HashSet;

use super::RankedItem;
use crate::catalog::CatalogRecord;
use crate::query::{is_stopword, phrase_acronym, tokenize};

/// Characters of free text that count toward similarity
const FREE_TEXT_PREFIX_CHARS: usize = 160;

#[derive(Debug, Clone)]
pub struct DiversifyConfig {
    /// How many top results are checked for clustering
    pub top_n: usize,
    /// Pairwise Jaccard similarity above which two results count as near-duplicates
    pub threshold: f32,
    /// How many results MMR selects before the rest follow by relevance
    pub k: usize,
    /// Relevance weight; `1 - lambda` weighs dissimilarity
    pub lambda: f32,
}

impl Default for DiversifyConfig {
    fn default() -> Self {
        Self {
            top_n: 8,
            threshold: 0.55,
            k: 20,
            lambda: 0.7,
        }
    }
}

/// Token set describing a record for similarity
pub fn similarity_tokens(record: &CatalogRecord) -> HashSet<String> {
    let mut tokens = HashSet::new();

    for tag in record.all_tags() {
        if let Some(acronym) = phrase_acronym(&tag) {
            tokens.insert(acronym);
        }
        tokens.extend(tag.split_whitespace().map(str::to_string));
    }

    tokens.extend(tokenize(&record.name).into_iter().filter(|t| !is_stopword(t)));

    let free_text: String = format!("{} {}", record.keywords, record.overview)
        .chars()
        .take(FREE_TEXT_PREFIX_CHARS)
        .collect();
    tokens.extend(tokenize(&free_text).into_iter().filter(|t| !is_stopword(t)));

    tokens
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Whether more than half of the top-N pairs are near-duplicates
pub fn should_diversify(items: &[RankedItem], config: &DiversifyConfig) -> bool {
    let top: Vec<HashSet<String>> = items
        .iter()
        .take(config.top_n)
        .map(|item| similarity_tokens(&item.hit.record))
        .collect();

    let pairs = top.len() * top.len().saturating_sub(1) / 2;
    if pairs == 0 {
        return false;
    }

    let mut similar = 0;
    for i in 0..top.len() {
        for j in (i + 1)..top.len() {
            if jaccard(&top[i], &top[j]) > config.threshold {
                similar += 1;
            }
        }
    }
    similar * 2 > pairs
}

/// Maximal Marginal Relevance reorder of relevance-sorted `items`
///
/// The top item is kept first. Up to `k` items are chosen by
/// `lambda * relevance - (1 - lambda) * max similarity to those already
/// chosen`; the remainder follow in relevance order.
pub fn mmr_reorder(items: Vec<RankedItem>, k: usize, lambda: f32) -> Vec<RankedItem> {
    if items.len() <= 2 || k <= 1 {
        return items;
    }

    let tokens: Vec<HashSet<String>> = items
        .iter()
        .map(|item| similarity_tokens(&item.hit.record))
        .collect();

    let mut selected: Vec<usize> = vec![0];
    let mut remaining: Vec<usize> = (1..items.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;

        for (pos, &candidate) in remaining.iter().enumerate() {
            let max_similarity = selected
                .iter()
                .map(|&s| jaccard(&tokens[candidate], &tokens[s]))
                .fold(0.0f32, f32::max);
            let mmr = lambda * items[candidate].fused_score - (1.0 - lambda) * max_similarity;

            // Strict comparison keeps the more relevant candidate on ties
            if best.map_or(true, |(_, score)| mmr > score) {
                best = Some((pos, mmr));
            }
        }

        match best {
            Some((pos, _)) => selected.push(remaining.remove(pos)),
            None => break,
        }
    }

    // `remaining` is still in relevance order
    selected.extend(remaining);

    let mut slots: Vec<Option<RankedItem>> = items.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
