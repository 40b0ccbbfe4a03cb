//! Wiring from [`Config`] to live components

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::catalog::{
    CachedCatalogSource, CatalogError, CatalogSource, FileCatalogSource, SheetCatalogSource,
};
use crate::config::Config;
use crate::embedding::{
    BatchProcessor, ClientSettings, EmbeddingClient, EmbeddingError, HnswSettings,
    HnswVectorStore, HttpEmbeddingProvider, HttpProviderSettings, QdrantSettings,
    QdrantVectorStore, RetryPolicy, VectorStore,
};
use crate::error::{Result, TeamSearchError};
use crate::retrieval::HybridSearcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    /// `None` when no embedding endpoint is configured
    pub embedder: Option<Arc<EmbeddingClient>>,
    pub store: Arc<dyn VectorStore>,
    pub catalog: Arc<dyn CatalogSource>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TeamSearchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let embedder = build_embedder(&config, &http_client);
        let store = build_store(&config, &http_client).await?;
        let catalog = build_catalog(&config, &http_client)?;

        Ok(Self {
            config,
            http_client,
            embedder,
            store,
            catalog,
        })
    }

    pub fn searcher(&self) -> HybridSearcher {
        HybridSearcher::new(
            self.embedder.clone(),
            self.store.clone(),
            self.config.retrieval.clone(),
        )
    }

    /// Indexing needs an embedder; unlike search it does not degrade silently
    pub fn batch_processor(&self) -> Result<BatchProcessor> {
        let client = self.embedder.clone().ok_or_else(|| {
            EmbeddingError::NotConfigured("set embedding.base_url to index the catalog".to_string())
        })?;

        Ok(BatchProcessor::new(
            client,
            self.store.clone(),
            self.config.embedding.batch_size,
            self.config.embedding.max_concurrent,
        ))
    }
}

/// Read the secret named by an `api_key_env` setting
fn secret_from_env(var: Option<&str>) -> Option<String> {
    let var = var?;
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{} is not set; sending requests without an API key", var);
            None
        }
    }
}

fn build_embedder(config: &Config, http: &reqwest::Client) -> Option<Arc<EmbeddingClient>> {
    let embedding = &config.embedding;
    let Some(base_url) = embedding.base_url.clone() else {
        warn!("embedding.base_url is not set; search will return no results");
        return None;
    };

    let provider = HttpEmbeddingProvider::new(
        http.clone(),
        HttpProviderSettings {
            base_url,
            model: embedding.model.clone(),
            dimension: embedding.dimension,
            api_key: secret_from_env(embedding.api_key_env.as_deref()),
            query_prefix: embedding.query_prefix.clone(),
            passage_prefix: embedding.passage_prefix.clone(),
            timeout: Duration::from_secs(embedding.timeout_secs),
        },
    );

    let settings = ClientSettings {
        retry: RetryPolicy {
            max_attempts: embedding.max_attempts,
            base_delay: Duration::from_millis(embedding.base_backoff_ms),
            max_delay: Duration::from_millis(embedding.max_backoff_ms),
        },
        hedge_delay: (embedding.hedge_delay_ms > 0)
            .then(|| Duration::from_millis(embedding.hedge_delay_ms)),
        cache_ttl: Duration::from_secs(embedding.cache_ttl_secs),
        cache_max_entries: embedding.cache_max_entries,
    };

    Some(Arc::new(EmbeddingClient::new(Arc::new(provider), settings)))
}

async fn build_store(config: &Config, http: &reqwest::Client) -> Result<Arc<dyn VectorStore>> {
    let store = &config.vector_store;
    match store.backend.as_str() {
        "qdrant" => {
            let url = store.url.clone().ok_or_else(|| {
                TeamSearchError::Config("vector_store.url is required for qdrant".to_string())
            })?;
            info!("Using Qdrant collection '{}' at {}", store.collection, url);
            Ok(Arc::new(QdrantVectorStore::new(
                http.clone(),
                QdrantSettings {
                    url,
                    collection: store.collection.clone(),
                    api_key: secret_from_env(store.api_key_env.as_deref()),
                    timeout: Duration::from_secs(store.timeout_secs),
                },
            )))
        }
        "hnsw" => {
            let settings = HnswSettings {
                m: store.hnsw_m,
                ef_construction: store.hnsw_ef_construction,
                ef_search: store.hnsw_ef_search,
                max_elements: store.max_elements,
            };
            Ok(Arc::new(HnswVectorStore::open(store.path.clone(), settings).await?))
        }
        other => Err(TeamSearchError::InvalidConfigValue {
            path: "vector_store.backend".to_string(),
            message: format!("Unknown backend '{}'", other),
        }),
    }
}

fn build_catalog(config: &Config, http: &reqwest::Client) -> Result<Arc<dyn CatalogSource>> {
    let catalog = &config.catalog;
    let ttl = Duration::from_secs(catalog.cache_ttl_secs);

    let source: Arc<dyn CatalogSource> = match catalog.source.as_str() {
        "file" => {
            let path = catalog.path.clone().ok_or_else(|| {
                CatalogError::MissingConfiguration("catalog.path".to_string())
            })?;
            Arc::new(CachedCatalogSource::new(FileCatalogSource::new(path), ttl))
        }
        "sheet" => {
            let url = catalog.url.clone().ok_or_else(|| {
                CatalogError::MissingConfiguration("catalog.url".to_string())
            })?;
            let api_key = secret_from_env(catalog.api_key_env.as_deref());
            Arc::new(CachedCatalogSource::new(
                SheetCatalogSource::new(http.clone(), url, api_key),
                ttl,
            ))
        }
        other => {
            return Err(CatalogError::MissingConfiguration(format!(
                "unknown catalog source '{}'",
                other
            ))
            .into())
        }
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.catalog.path = Some(dir.join("catalog.json"));
        config.vector_store.path = dir.join("vectors.json");
        config
    }

    #[tokio::test]
    async fn test_state_without_embedding_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(local_config(dir.path())).await.unwrap();

        assert!(state.embedder.is_none());
        assert!(matches!(
            state.batch_processor(),
            Err(TeamSearchError::Embedding(EmbeddingError::NotConfigured(_)))
        ));
    }

    #[tokio::test]
    async fn test_state_with_embedding_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(dir.path());
        config.embedding.base_url = Some("http://localhost:9".to_string());
        config.embedding.api_key_env = None;
        config.embedding.dimension = 8;

        let state = AppState::new(config).await.unwrap();
        let embedder = state.embedder.as_ref().unwrap();
        assert_eq!(embedder.dimension(), 8);
        assert!(state.batch_processor().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(dir.path());
        config.vector_store.backend = "faiss".to_string();
        assert!(AppState::new(config).await.is_err());
    }
}
