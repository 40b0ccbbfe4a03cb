//! Hybrid search: vector retrieval followed by lexical fusion and MMR

use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingClient, VectorStore};
use crate::query::canonical_phrase;
use crate::retrieval::{
    decode_cursor, dedupe_by_name, encode_cursor, fuse_scores, mmr_reorder, name_key, paginate,
    pool_size, should_diversify, PageCursor, QueryContext, RankedItem, SearchHit, SearchPage,
    SearchQuery, SearchResult,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Query-path searcher
///
/// Search is best-effort: every failure (missing provider, embedding error,
/// vector store error, bad cursor) is logged and yields an empty result.
pub struct HybridSearcher {
    embedder: Option<Arc<EmbeddingClient>>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

/// Nearest neighbors in semantic order
struct Retrieved {
    ctx: QueryContext,
    hits: Vec<SearchHit>,
}

impl HybridSearcher {
    /// Create a new hybrid searcher; `embedder` is `None` when no embedding
    /// provider is configured
    pub fn new(
        embedder: Option<Arc<EmbeddingClient>>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Paged search with an opaque cursor
    ///
    /// Pages slice one pool segment at a time (see [`PageCursor`]), so a
    /// cursor walk never repeats a record. A segment past the first is only
    /// reached once every better semantic candidate has been served.
    pub async fn search_page(&self, query: &SearchQuery) -> SearchPage {
        let limit = query.limit.clamp(1, self.config.max_page_size.max(1));
        let sizing = self.config.pool_sizing();
        let step = pool_size(0, limit, sizing);

        let mut cursor = match query.cursor.as_deref() {
            None => PageCursor::first(step),
            Some(raw) => match decode_cursor(raw) {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!("Ignoring search request: {}", e);
                    return SearchPage::default();
                }
            },
        };
        if cursor.pool_start >= sizing.cap {
            return SearchPage::default();
        }
        cursor.pool_end = cursor.pool_end.min(sizing.cap);

        loop {
            let retrieved = self.retrieve(&query.text, cursor.pool_end).await;
            let Some(Retrieved { ctx, mut hits }) = retrieved else {
                return SearchPage::default();
            };
            let can_grow = hits.len() >= cursor.pool_end && cursor.pool_end < sizing.cap;
            let grown = cursor.pool_end.saturating_add(step).min(sizing.cap);

            let fresh = hits.split_off(cursor.pool_start.min(hits.len()));
            let served = self.select(hits, query.tag_filter.as_deref());
            let served_names: HashSet<String> = served.iter().map(name_key).collect();
            let fresh: Vec<SearchHit> = self
                .select(fresh, query.tag_filter.as_deref())
                .into_iter()
                .filter(|hit| !served_names.contains(&name_key(hit)))
                .collect();

            let ranked = self.order(fresh, &ctx);
            let total_estimate = served.len() + ranked.len();
            let page = paginate(ranked, cursor.page, limit);

            // An empty segment cannot end the walk while more candidates exist
            if page.items.is_empty() && cursor.page == 0 && can_grow {
                cursor = cursor.next_segment(grown);
                continue;
            }

            let next_cursor = if page.has_more {
                Some(cursor.next_page())
            } else if can_grow {
                Some(cursor.next_segment(grown))
            } else {
                None
            };

            return SearchPage {
                items: page.items.into_iter().map(SearchResult::from).collect(),
                next_cursor: next_cursor.map(encode_cursor),
                total_estimate,
            };
        }
    }

    /// Unpaged top-N search
    pub async fn search_top(&self, text: &str, limit: usize) -> Vec<SearchResult> {
        let limit = limit.clamp(1, self.config.max_limit.max(1));
        let sizing = self.config.pool_sizing();
        let k = limit.saturating_mul(sizing.multiplier).min(sizing.cap).max(limit);

        let Some(Retrieved { ctx, hits }) = self.retrieve(text, k).await else {
            return Vec::new();
        };
        let hits = self.select(hits, None);

        self.order(hits, &ctx)
            .into_iter()
            .take(limit)
            .map(SearchResult::from)
            .collect()
    }

    /// Embed the query and fetch up to `k` nearest neighbors
    async fn retrieve(&self, text: &str, k: usize) -> Option<Retrieved> {
        if text.trim().is_empty() {
            return None;
        }
        let Some(embedder) = &self.embedder else {
            warn!("No embedding provider configured; returning empty result");
            return None;
        };

        let ctx = QueryContext::new(text);

        let vector = match embedder.embed_query(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Query embedding failed for '{}': {}", ctx.normalized, e);
                return None;
            }
        };

        let matches = match self.store.search(&vector, k).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Vector search failed: {}", e);
                return None;
            }
        };

        let hits = matches
            .into_iter()
            .map(|m| SearchHit {
                id: m.id,
                record: m.payload,
                semantic_score: m.score,
            })
            .collect();
        Some(Retrieved { ctx, hits })
    }

    /// Apply the tag filter, then collapse repeated names
    fn select(&self, mut hits: Vec<SearchHit>, tag_filter: Option<&str>) -> Vec<SearchHit> {
        if let Some(tag) = tag_filter.map(canonical_phrase).filter(|t| !t.is_empty()) {
            hits.retain(|hit| hit.record.all_tags().contains(&tag));
        }
        dedupe_by_name(hits)
    }

    /// Final ranked order: fusion, then MMR when the top is clustered
    fn order(&self, hits: Vec<SearchHit>, ctx: &QueryContext) -> Vec<RankedItem> {
        let candidates = hits.len();
        let ranked = fuse_scores(hits, ctx, &self.config.weights);

        let diversify = self.config.diversify_config();
        let ranked = if should_diversify(&ranked, &diversify) {
            debug!("Top results are clustered; applying MMR");
            mmr_reorder(ranked, diversify.k, diversify.lambda)
        } else {
            ranked
        };

        debug!("Query '{}': {} candidates ranked", ctx.normalized, candidates);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRecord;
    use crate::embedding::{
        ClientSettings, EmbeddingError, EmbeddingMode, EmbeddingProvider, HnswSettings,
        HnswVectorStore, VectorPoint,
    };
    use async_trait::async_trait;

    struct ConstantProvider;

    #[async_trait]
    impl EmbeddingProvider for ConstantProvider {
        async fn embed_batch(
            &self,
            texts: &[String],
            _mode: EmbeddingMode,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    async fn store_with(records: &[(&str, &str)]) -> Arc<HnswVectorStore> {
        let store = Arc::new(HnswVectorStore::in_memory(HnswSettings::default()));
        store.ensure_index(2).await.unwrap();
        let points: Vec<VectorPoint> = records
            .iter()
            .enumerate()
            .map(|(i, (name, tags))| {
                let payload = CatalogRecord {
                    name: name.to_string(),
                    primary_tags: tags.to_string(),
                    ..Default::default()
                };
                VectorPoint {
                    id: payload.identity(),
                    vector: vec![1.0, i as f32 * 0.01],
                    payload,
                }
            })
            .collect();
        store.upsert(&points).await.unwrap();
        store
    }

    fn embedder() -> Option<Arc<EmbeddingClient>> {
        let settings = ClientSettings {
            hedge_delay: None,
            ..Default::default()
        };
        Some(Arc::new(EmbeddingClient::new(Arc::new(ConstantProvider), settings)))
    }

    #[tokio::test]
    async fn test_missing_embedder_returns_empty_page() {
        let store = store_with(&[("Acme", "SEO")]).await;
        let searcher = HybridSearcher::new(None, store, RetrievalConfig::default());

        let page = searcher.search_page(&SearchQuery::new("seo", 10)).await;
        assert!(page.items.is_empty());
        assert_eq!(page.total_estimate, 0);
        assert!(searcher.search_top("seo", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cursor_returns_empty_page() {
        let store = store_with(&[("Acme", "SEO")]).await;
        let searcher = HybridSearcher::new(embedder(), store, RetrievalConfig::default());

        let query = SearchQuery::new("seo", 10).with_cursor(Some("garbage!".to_string()));
        let page = searcher.search_page(&query).await;
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty_page() {
        let store = store_with(&[("Acme", "SEO")]).await;
        let searcher = HybridSearcher::new(embedder(), store, RetrievalConfig::default());
        assert!(searcher.search_page(&SearchQuery::new("   ", 10)).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_tag_filter_applies_before_paging() {
        let store = store_with(&[("Acme", "SEO"), ("Beta", "PR"), ("Gamma", "SEO, PR")]).await;
        let searcher = HybridSearcher::new(embedder(), store, RetrievalConfig::default());

        let query = SearchQuery::new("agency", 10).with_tag(Some("pr".to_string()));
        let page = searcher.search_page(&query).await;
        assert_eq!(page.total_estimate, 2);
        assert!(page.items.iter().all(|r| r.record.all_tags().contains(&"pr".to_string())));
    }

    #[tokio::test]
    async fn test_limits_are_clamped() {
        let records: Vec<(String, String)> =
            (0..60).map(|i| (format!("Team {i}"), "SEO".to_string())).collect();
        let refs: Vec<(&str, &str)> = records
            .iter()
            .map(|(n, t)| (n.as_str(), t.as_str()))
            .collect();
        let store = store_with(&refs).await;
        let searcher = HybridSearcher::new(embedder(), store, RetrievalConfig::default());

        let page = searcher.search_page(&SearchQuery::new("seo", 500)).await;
        assert_eq!(page.items.len(), 50);
        assert!(page.next_cursor.is_some());

        let page = searcher.search_page(&SearchQuery::new("seo", 0)).await;
        assert_eq!(page.items.len(), 1);

        let first = searcher.search_page(&SearchQuery::new("seo", 50)).await;
        let deep = SearchQuery::new("seo", 50).with_cursor(first.next_cursor);
        assert_eq!(searcher.search_page(&deep).await.items.len(), 10);
    }
}
