//! Hybrid score fusion
//!
//! Every signal is an additive adjustment on top of the semantic score. The
//! anchor-intent rule is the one that matters most: a query naming a canonical
//! category must outrank embedding proximity for records lacking that category.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::intents::{ANCHOR_INTENTS, SYNONYM_FAMILIES};
use super::{RankedItem, ScoreBreakdown, SearchHit};
use crate::catalog::CatalogRecord;
use crate::query::{
    acronym, canonical_phrase, contains_phrase, extract_exact_phrases, normalize, phrase_acronym,
    tokenize,
};

/// Signal weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub primary_tag: f32,
    pub secondary_tag: f32,
    pub free_text_per_token: f32,
    pub free_text_max_tokens: usize,
    pub acronym: f32,
    /// Subtracted when neither tags nor free text match
    pub guardrail_penalty: f32,
    pub partner_confirmed: f32,
    pub phrase_in_tag: f32,
    pub phrase_in_name: f32,
    pub phrase_in_keywords: f32,
    pub phrase_cap: f32,
    pub synonym_nudge: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            primary_tag: 0.30,
            secondary_tag: 0.15,
            free_text_per_token: 0.06,
            free_text_max_tokens: 3,
            acronym: 0.08,
            guardrail_penalty: 0.10,
            partner_confirmed: 0.03,
            phrase_in_tag: 0.35,
            phrase_in_name: 0.20,
            phrase_in_keywords: 0.10,
            phrase_cap: 0.60,
            synonym_nudge: 0.15,
        }
    }
}

/// Query-side inputs shared by every record scored in one request
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw: String,
    /// Stopword-free canonical query
    pub normalized: String,
    /// Canonical query with stopwords kept, used for intent detection
    pub canonical: String,
    /// Distinct tokens of `normalized`, in order
    pub tokens: Vec<String>,
    pub phrases: Vec<String>,
}

impl QueryContext {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        let mut tokens: Vec<String> = Vec::new();
        for token in normalized.split_whitespace() {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }

        Self {
            raw: raw.to_string(),
            canonical: canonical_phrase(raw),
            phrases: extract_exact_phrases(raw),
            normalized,
            tokens,
        }
    }

    /// Acronym formed by a multi-word query
    fn acronym(&self) -> Option<String> {
        let words: Vec<&str> = self.tokens.iter().map(String::as_str).collect();
        acronym(&words)
    }

    /// A tag entry matches when a query token equals it or the query contains
    /// the whole (multi-word) entry
    fn matches_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| {
            self.tokens.iter().any(|t| t == tag)
                || (tag.contains(' ') && contains_phrase(&self.normalized, tag))
        })
    }
}

fn free_text_tokens(record: &CatalogRecord) -> HashSet<String> {
    [&record.keywords, &record.overview, &record.industry_expertise]
        .iter()
        .flat_map(|field| tokenize(field))
        .collect()
}

fn score_record(
    record: &CatalogRecord,
    ctx: &QueryContext,
    weights: &FusionWeights,
) -> ScoreBreakdown {
    let mut b = ScoreBreakdown::default();

    let primary = record.primary_tag_list();
    let secondary = record.secondary_tag_list();
    let tags = record.all_tags();

    let primary_hit = ctx.matches_any_tag(&primary);
    let secondary_hit = ctx.matches_any_tag(&secondary);
    if primary_hit {
        b.primary_tag = weights.primary_tag;
    }
    if secondary_hit {
        b.secondary_tag = weights.secondary_tag;
    }

    let free_text = free_text_tokens(record);
    let overlap = ctx
        .tokens
        .iter()
        .filter(|t| free_text.contains(t.as_str()))
        .count()
        .min(weights.free_text_max_tokens);
    b.free_text = overlap as f32 * weights.free_text_per_token;

    let tag_acronyms: Vec<String> = tags.iter().filter_map(|t| phrase_acronym(t)).collect();
    let acronym_hit = match ctx.acronym() {
        Some(query_acronym) => {
            tag_acronyms.contains(&query_acronym) || tags.contains(&query_acronym)
        }
        None => ctx.tokens.len() == 1 && tag_acronyms.contains(&ctx.tokens[0]),
    };
    if acronym_hit {
        b.acronym = weights.acronym;
    }

    if !primary_hit && !secondary_hit && overlap == 0 {
        b.guardrail = -weights.guardrail_penalty;
    }

    if !record.partner_confirmation.trim().is_empty() {
        b.partner = weights.partner_confirmed;
    }

    for intent in ANCHOR_INTENTS.iter().filter(|i| i.detected_in(&ctx.canonical)) {
        if intent.satisfied_by(&tags) {
            b.anchor += intent.bonus;
        } else {
            b.anchor -= intent.penalty;
        }
    }

    let name = canonical_phrase(&record.name);
    let keywords = canonical_phrase(&record.keywords);
    let mut phrase = 0.0;
    for p in &ctx.phrases {
        if tags.iter().any(|tag| contains_phrase(tag, p)) {
            phrase += weights.phrase_in_tag;
        }
        if contains_phrase(&name, p) {
            phrase += weights.phrase_in_name;
        }
        if contains_phrase(&keywords, p) {
            phrase += weights.phrase_in_keywords;
        }
    }
    b.phrase = phrase.min(weights.phrase_cap);

    let mut described = tags;
    described.push(keywords);
    let nudges = SYNONYM_FAMILIES
        .iter()
        .filter(|f| f.detected_in(&ctx.canonical) && f.mentioned_in(&described))
        .count();
    b.synonym = nudges as f32 * weights.synonym_nudge;

    b
}

/// Score every hit against the query and sort best first
///
/// Ties on fused score fall back to identity order, so identical inputs always
/// produce identical output. Scores are not clamped at zero.
pub fn fuse_scores(
    hits: Vec<SearchHit>,
    ctx: &QueryContext,
    weights: &FusionWeights,
) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = hits
        .into_iter()
        .map(|hit| {
            let mut item = RankedItem::new(hit);
            let signals = score_record(&item.hit.record, ctx, weights);
            item.breakdown = ScoreBreakdown {
                semantic: item.breakdown.semantic,
                ..signals
            };
            item.fused_score = item.breakdown.total();
            item
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.hit.id.cmp(&b.hit.id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: &str, primary: &str, score: f32) -> SearchHit {
        let record = CatalogRecord {
            name: name.to_string(),
            primary_tags: primary.to_string(),
            ..Default::default()
        };
        SearchHit {
            id: record.identity(),
            record,
            semantic_score: score,
        }
    }

    fn fuse(query: &str, hits: Vec<SearchHit>) -> Vec<RankedItem> {
        fuse_scores(hits, &QueryContext::new(query), &FusionWeights::default())
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_anchor_scenario() {
        let ranked = fuse(
            "SEO",
            vec![
                hit("Team B", "PR", 0.5),
                hit("Team A", "SEO, Content", 0.5),
            ],
        );

        assert_eq!(ranked[0].hit.record.name, "Team A");
        assert!(approx(ranked[0].fused_score, 0.92), "{}", ranked[0].fused_score);
        assert!(approx(ranked[1].fused_score, 0.18), "{}", ranked[1].fused_score);
        assert!(approx(ranked[1].breakdown.guardrail, -0.10));
        assert!(approx(ranked[1].breakdown.anchor, -0.22));
    }

    #[test]
    fn test_tag_match_beats_no_overlap_by_guardrail_gap() {
        let ranked = fuse(
            "kubernetes",
            vec![hit("Plain", "Accounting", 0.6), hit("Tagged", "Kubernetes", 0.6)],
        );
        assert_eq!(ranked[0].hit.record.name, "Tagged");
        assert!(ranked[0].fused_score - ranked[1].fused_score >= 0.40 - 1e-5);
    }

    #[test]
    fn test_free_text_overlap_is_capped() {
        let mut h = hit("Verbose", "", 0.0);
        h.record.keywords = "rust go python java kotlin".to_string();
        let ranked = fuse("rust go python java", vec![h]);
        assert!(approx(ranked[0].breakdown.free_text, 0.18));
        assert!(approx(ranked[0].breakdown.guardrail, 0.0));
    }

    #[test]
    fn test_secondary_and_partner_signals() {
        let mut h = hit("Acme", "Content", 0.1);
        h.record.secondary_tags = "Copywriting".to_string();
        h.record.partner_confirmation = "Yes".to_string();
        let ranked = fuse("copywriting", vec![h]);
        let b = &ranked[0].breakdown;
        assert!(approx(b.secondary_tag, 0.15));
        assert!(approx(b.primary_tag, 0.0));
        assert!(approx(b.partner, 0.03));
    }

    #[test]
    fn test_acronym_matches_multi_word_tag() {
        let ranked = fuse("ppc", vec![hit("Ads", "Pay Per Click", 0.2)]);
        assert!(approx(ranked[0].breakdown.acronym, 0.08));

        let ranked = fuse("pay per click", vec![hit("Ads", "PPC", 0.2)]);
        assert!(approx(ranked[0].breakdown.acronym, 0.08));
    }

    #[test]
    fn test_phrase_bonus_is_capped() {
        let mut h = hit("Content Marketing Co", "Content Marketing", 0.0);
        h.record.keywords = "content marketing experts".to_string();
        let ranked = fuse("\"content marketing\" strategy", vec![h]);
        assert!(approx(ranked[0].breakdown.phrase, 0.60));
    }

    #[test]
    fn test_synonym_nudge() {
        let mut h = hit("Appsmiths", "Development", 0.3);
        h.record.keywords = "iOS and Android apps".to_string();
        let ranked = fuse("mobile app", vec![h]);
        assert!(approx(ranked[0].breakdown.synonym, 0.15));
    }

    #[test]
    fn test_scores_are_not_clamped() {
        let ranked = fuse("ci/cd", vec![hit("Brand House", "Branding", 0.05)]);
        assert!(ranked[0].fused_score < 0.0);
    }

    #[test]
    fn test_ties_break_on_identity() {
        let a = hit("Alpha", "", 0.5);
        let b = hit("Bravo", "", 0.5);
        let expected_first = if a.id < b.id { "Alpha" } else { "Bravo" };

        let ranked = fuse("zzz", vec![b.clone(), a.clone()]);
        assert_eq!(ranked[0].hit.record.name, expected_first);
        let ranked = fuse("zzz", vec![a, b]);
        assert_eq!(ranked[0].hit.record.name, expected_first);
    }

    #[test]
    fn test_breakdown_sums_to_fused_score() {
        let mut h = hit("Acme SEO", "SEO, Content", 0.42);
        h.record.keywords = "link building".to_string();
        let ranked = fuse("seo link building", vec![h]);
        assert!(approx(ranked[0].breakdown.total(), ranked[0].fused_score));
        assert!(approx(ranked[0].breakdown.semantic, 0.42));
    }
}
