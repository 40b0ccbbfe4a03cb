/// Embedding client: retries, split-and-retry batches, query cache and hedging
use super::{EmbeddingError, EmbeddingMode, EmbeddingProvider};
use crate::cache::{Clock, SystemClock, TtlCache};
use crate::query::normalize;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Capped exponential backoff with equal jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let half_ms = (ceiling.as_millis() / 2) as u64;
        let jitter = rand::thread_rng().gen_range(0..=half_ms);
        Duration::from_millis(half_ms + jitter)
    }
}

/// Tuning for [`EmbeddingClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub retry: RetryPolicy,
    /// Delay before a second query request is raced; `None` disables hedging
    pub hedge_delay: Option<Duration>,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            hedge_delay: Some(Duration::from_millis(400)),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 512,
        }
    }
}

/// (model, dimension, normalized query)
type QueryKey = (String, usize, String);

type SplitFuture<'a> =
    Pin<Box<dyn Future<Output = Vec<Result<Vec<f32>, EmbeddingError>>> + Send + 'a>>;

/// Policy layer over an [`EmbeddingProvider`]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    settings: ClientSettings,
    query_cache: TtlCache<QueryKey, Arc<Vec<f32>>>,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, settings: ClientSettings) -> Self {
        Self::with_clock(provider, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn EmbeddingProvider>,
        settings: ClientSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let query_cache =
            TtlCache::with_clock(settings.cache_max_entries, settings.cache_ttl, clock);
        Self {
            provider,
            settings,
            query_cache,
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// One provider call whose result count must match the input
    async fn attempt(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.provider.embed_batch(texts, mode).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Call the provider, retrying retryable failures with backoff
    pub async fn embed_with_retry(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(texts, mode).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(EmbeddingError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.settings.retry.backoff(attempt);
                    warn!(
                        "Embedding attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Embed a search query, served from the query cache when possible
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty query".to_string()));
        }

        let key = (
            self.model_name().to_string(),
            self.dimension(),
            normalized.clone(),
        );
        if let Some(vector) = self.query_cache.get(&key) {
            debug!("Query embedding cache hit for '{}'", normalized);
            return Ok(vector.as_ref().clone());
        }

        let vector = match self.settings.hedge_delay {
            Some(delay) => self.embed_hedged(&normalized, delay).await?,
            None => first_vector(
                self.embed_with_retry(&[normalized.clone()], EmbeddingMode::Query)
                    .await?,
            )?,
        };

        self.query_cache.insert(key, Arc::new(vector.clone()));
        Ok(vector)
    }

    /// Race a primary request against a delayed hedge request
    async fn embed_hedged(&self, text: &str, delay: Duration) -> Result<Vec<f32>, EmbeddingError> {
        let input = [text.to_string()];

        let primary = self.attempt(&input, EmbeddingMode::Query);
        tokio::pin!(primary);

        tokio::select! {
            result = &mut primary => {
                return match result {
                    Ok(vectors) => first_vector(vectors),
                    Err(e) if e.is_retryable() => {
                        debug!("Primary query embedding failed early ({}); retrying once", e);
                        first_vector(self.attempt(&input, EmbeddingMode::Query).await?)
                    }
                    Err(e) => Err(e),
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }

        debug!("No query embedding after {:?}; sending hedge request", delay);
        let hedge = self.attempt(&input, EmbeddingMode::Query);
        tokio::pin!(hedge);

        let vectors = tokio::select! {
            result = &mut primary => match result {
                Ok(vectors) => vectors,
                Err(e) => {
                    debug!("Primary query embedding failed ({}); awaiting hedge", e);
                    hedge.await?
                }
            },
            result = &mut hedge => match result {
                Ok(vectors) => {
                    debug!("Hedge request won the race");
                    vectors
                }
                Err(e) => {
                    debug!("Hedge query embedding failed ({}); awaiting primary", e);
                    primary.await?
                }
            },
        };

        first_vector(vectors)
    }

    /// Embed passages, isolating failures down to single items.
    ///
    /// A batch that still fails after retries is split in half and each half
    /// retried, so one bad input only fails itself. Results are in input order.
    pub async fn embed_passages_isolated(
        &self,
        texts: &[String],
    ) -> Vec<Result<Vec<f32>, EmbeddingError>> {
        self.embed_split(texts).await
    }

    fn embed_split<'a>(&'a self, texts: &'a [String]) -> SplitFuture<'a> {
        Box::pin(async move {
            if texts.is_empty() {
                return Vec::new();
            }

            match self.embed_with_retry(texts, EmbeddingMode::Passage).await {
                Ok(vectors) => vectors.into_iter().map(Ok).collect(),
                Err(e) if texts.len() == 1 => vec![Err(e)],
                Err(e) => {
                    let mid = texts.len() / 2;
                    warn!(
                        "Batch of {} passages failed ({}); splitting into {} + {}",
                        texts.len(),
                        e,
                        mid,
                        texts.len() - mid
                    );
                    let mut results = self.embed_split(&texts[..mid]).await;
                    results.extend(self.embed_split(&texts[mid..]).await);
                    results
                }
            }
        })
    }

    /// Embed passages, failing if any single passage fails
    pub async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_passages_isolated(texts).await.into_iter().collect()
    }
}

fn first_vector(vectors: Vec<Vec<f32>>) -> Result<Vec<f32>, EmbeddingError> {
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding returned".to_string()))
}
