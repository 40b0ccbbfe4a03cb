//! Integration tests: hybrid retrieval over a local vector store
//!
//! Deterministic in-process providers stand in for the embedding API.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use teamsearch::catalog::{CatalogRecord, StableIdentity};
use teamsearch::config::RetrievalConfig;
use teamsearch::embedding::{
    BatchProcessor, ClientSettings, EmbeddingClient, EmbeddingError, EmbeddingMode,
    EmbeddingProvider, HnswSettings, HnswVectorStore, VectorIndexError, VectorMatch, VectorPoint,
    VectorStore,
};
use teamsearch::query::canonical_phrase;
use teamsearch::retrieval::{HybridSearcher, SearchQuery, SearchResult};

const DIM: usize = 32;

/// Bag-of-hashed-tokens embedding
struct HashingProvider;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    vector[0] = 0.5;
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let bucket = token
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % DIM] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        _mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

fn team(name: &str, tags: &str, timestamp: &str) -> CatalogRecord {
    CatalogRecord {
        timestamp: timestamp.to_string(),
        name: name.to_string(),
        primary_tags: tags.to_string(),
        ..Default::default()
    }
}

/// Places SEO teams farther from every query than all other teams
struct ClusterProvider;

#[async_trait]
impl EmbeddingProvider for ClusterProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                if mode == EmbeddingMode::Query {
                    return vec![1.0, 0.05, 0.0];
                }
                // Text starts with the "Team N" name line
                let n: f32 = text
                    .split_whitespace()
                    .nth(1)
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0.0);
                if text.to_lowercase().contains("seo") {
                    vec![0.6, 0.8, n * 0.001]
                } else {
                    vec![1.0, 0.0, n * 0.001]
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "cluster"
    }
}

/// Brute-force cosine store with a total order on ties
#[derive(Default)]
struct ExactStore {
    points: tokio::sync::Mutex<Vec<VectorPoint>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b))
}

#[async_trait]
impl VectorStore for ExactStore {
    async fn ensure_index(&self, _dimension: usize) -> Result<(), VectorIndexError> {
        Ok(())
    }

    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), VectorIndexError> {
        let mut stored = self.points.lock().await;
        for point in points {
            stored.retain(|p| p.id != point.id);
            stored.push(point.clone());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, VectorIndexError> {
        let stored = self.points.lock().await;
        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|p| VectorMatch {
                id: p.id.clone(),
                score: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(k);
        Ok(matches)
    }
}

/// Index `records` into `store` and return a searcher over it
async fn index_into(
    records: Vec<CatalogRecord>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> HybridSearcher {
    let settings = ClientSettings {
        hedge_delay: None,
        ..Default::default()
    };
    let client = Arc::new(EmbeddingClient::new(provider, settings));

    let processor = BatchProcessor::new(client.clone(), store.clone(), 8, 2);
    let report = processor.process(records).await.unwrap();
    assert!(report.is_complete(), "failed: {:?}", report.failed);

    HybridSearcher::new(Some(client), store, RetrievalConfig::default())
}

async fn searcher_for(records: Vec<CatalogRecord>) -> HybridSearcher {
    let store = Arc::new(HnswVectorStore::in_memory(HnswSettings::default()));
    index_into(records, Arc::new(HashingProvider), store).await
}

/// Follow `next_cursor` to the end, returning every item and the last estimate
async fn walk(searcher: &HybridSearcher, text: &str, limit: usize) -> (Vec<SearchResult>, usize) {
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let query = SearchQuery::new(text, limit).with_cursor(cursor);
        let page = searcher.search_page(&query).await;
        assert!(page.items.len() <= limit);
        items.extend(page.items);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return (items, page.total_estimate),
        }
    }
}

#[tokio::test]
async fn test_anchor_intent_outranks_embedding_proximity() {
    let searcher = searcher_for(vec![
        team("Team B", "PR", "2024-01-01"),
        team("Team A", "SEO, Content", "2024-01-02"),
    ])
    .await;

    let page = searcher.search_page(&SearchQuery::new("SEO", 10)).await;
    assert_eq!(page.items.len(), 2);

    let first = &page.items[0];
    let second = &page.items[1];
    assert_eq!(first.record.name, "Team A");
    assert!((first.breakdown.primary_tag - 0.30).abs() < 1e-5);
    assert!((first.breakdown.anchor - 0.12).abs() < 1e-5);
    assert!((second.breakdown.guardrail + 0.10).abs() < 1e-5);
    assert!((second.breakdown.anchor + 0.22).abs() < 1e-5);
    assert!(first.score > second.score);
}

#[tokio::test]
async fn test_same_name_collapses_to_one_result() {
    let searcher = searcher_for(vec![
        team("Acme", "SEO", "2024-01-01"),
        team("ACME ", "PR", "2024-02-01"),
        team("Bolt Labs", "Design", "2024-03-01"),
    ])
    .await;

    let page = searcher.search_page(&SearchQuery::new("acme", 10)).await;
    let acme_count = page
        .items
        .iter()
        .filter(|r| canonical_phrase(&r.record.name) == "acme")
        .count();
    assert_eq!(acme_count, 1);
    assert_eq!(page.total_estimate, 2);
}

#[tokio::test]
async fn test_cursor_walk_covers_pool_without_repeats() {
    let records: Vec<CatalogRecord> = (0..25)
        .map(|i| {
            let tags = if i % 2 == 0 { "Web, Design" } else { "Web, Development" };
            team(&format!("Studio {i}"), tags, "2024-05-01")
        })
        .collect();
    let searcher = searcher_for(records).await;

    let (items, total_estimate) = walk(&searcher, "web studio", 10).await;

    let distinct: HashSet<&StableIdentity> = items.iter().map(|r| &r.id).collect();
    assert_eq!(distinct.len(), items.len());
    assert_eq!(items.len(), total_estimate);
    assert_eq!(items.len(), 25);
}

#[tokio::test]
async fn test_cursor_walk_across_pool_segments() {
    // The first pool holds only near accounting teams; the far SEO teams
    // enter with the second one
    let records: Vec<CatalogRecord> = (0..60)
        .map(|i| {
            let tags = if i < 40 { "Accounting" } else { "SEO" };
            team(&format!("Team {i}"), tags, "2024-07-01")
        })
        .collect();
    let store: Arc<dyn VectorStore> = Arc::new(ExactStore::default());
    let searcher = index_into(records, Arc::new(ClusterProvider), store).await;

    let (items, total_estimate) = walk(&searcher, "seo", 10).await;
    let names: Vec<&str> = items.iter().map(|r| r.record.name.as_str()).collect();

    let distinct: HashSet<&str> = names.iter().copied().collect();
    assert_eq!(distinct.len(), names.len(), "repeated results: {:?}", names);
    assert_eq!(names.len(), 60);
    assert_eq!(total_estimate, 60);

    let is_seo = |name: &str| name["Team ".len()..].parse::<usize>().unwrap() >= 40;
    // First pool: the 30 nearest accounting teams in semantic order
    assert!(names[..30].iter().all(|n| !is_seo(n)));
    assert_eq!(names[0], "Team 0");
    // Second pool: fusion lifts every SEO team above the remaining accounting teams
    assert!(names[30..50].iter().all(|n| is_seo(n)));
    assert!(names[50..].iter().all(|n| !is_seo(n)));
}

#[tokio::test]
async fn test_stopword_only_query_still_returns_results() {
    let searcher = searcher_for(vec![
        team("Northwind", "Consulting", "2024-01-01"),
        team("Southwind", "Design", "2024-01-02"),
    ])
    .await;

    let page = searcher.search_page(&SearchQuery::new("i need a team", 10)).await;
    assert!(!page.items.is_empty());

    let top = searcher.search_top("i need a team", 5).await;
    assert_eq!(top.len(), 2);
}

#[tokio::test]
async fn test_results_are_deterministic() {
    let searcher = searcher_for(vec![
        team("Alpha", "Mobile", "2024-01-01"),
        team("Bravo", "Mobile", "2024-01-02"),
        team("Charlie", "Branding", "2024-01-03"),
    ])
    .await;

    let ids = |results: Vec<SearchResult>| {
        results.into_iter().map(|r| r.id).collect::<Vec<_>>()
    };
    let first = ids(searcher.search_top("mobile app team", 10).await);
    let second = ids(searcher.search_top("mobile app team", 10).await);
    assert_eq!(first, second);
}
