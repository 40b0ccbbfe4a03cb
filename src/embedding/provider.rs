/// Embedding provider trait and the OpenAI-compatible HTTP implementation
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Maximum characters sent per input; longer inputs are cut on a char boundary
const MAX_EMBED_CHARS: usize = 8_000;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Transient provider error (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("Provider rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    /// Classify an HTTP failure status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 | 500 | 503 => EmbeddingError::Transient { status, message },
            _ => EmbeddingError::Rejected { status, message },
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Transient { .. } | EmbeddingError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EmbeddingError::MalformedResponse(e.to_string())
        } else {
            EmbeddingError::Transport(e.to_string())
        }
    }
}

/// Whether a text is a search query or a document passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Query,
    Passage,
}

/// Trait for embedding providers
///
/// One call is one provider request; retries, batching and caching live in
/// [`EmbeddingClient`](super::EmbeddingClient).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text, returning vectors in input order
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Settings for [`HttpEmbeddingProvider`]
#[derive(Debug, Clone)]
pub struct HttpProviderSettings {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub api_key: Option<String>,
    pub query_prefix: String,
    pub passage_prefix: String,
    pub timeout: Duration,
}

/// Provider speaking the OpenAI-compatible `/v1/embeddings` API
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    settings: HttpProviderSettings,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Truncate `text` to at most `MAX_EMBED_CHARS` bytes, on a UTF-8 char boundary
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl HttpEmbeddingProvider {
    pub fn new(client: reqwest::Client, settings: HttpProviderSettings) -> Self {
        Self { client, settings }
    }

    fn prefix(&self, mode: EmbeddingMode) -> &str {
        match mode {
            EmbeddingMode::Query => &self.settings.query_prefix,
            EmbeddingMode::Passage => &self.settings.passage_prefix,
        }
    }

    /// Put response vectors back in request order and check their shape
    fn order_response(
        &self,
        mut data: Vec<EmbedData>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if data.len() != expected {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }

        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index.unwrap_or_default());
        }

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.settings.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.settings.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let prefix = self.prefix(mode);
        let input: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", prefix, truncate_for_embedding(t)))
            .collect();

        let url = format!(
            "{}/v1/embeddings",
            self.settings.base_url.trim_end_matches('/')
        );
        let mut request = self
            .client
            .post(&url)
            .timeout(self.settings.timeout)
            .json(&EmbedRequest {
                model: &self.settings.model,
                input,
            });
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::from_status(status, body));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        self.order_response(body.data, texts.len())
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dimension: usize) -> HttpEmbeddingProvider {
        HttpEmbeddingProvider::new(
            reqwest::Client::new(),
            HttpProviderSettings {
                base_url: "http://localhost:9".to_string(),
                model: "test-model".to_string(),
                dimension,
                api_key: None,
                query_prefix: "query: ".to_string(),
                passage_prefix: "passage: ".to_string(),
                timeout: Duration::from_secs(1),
            },
        )
    }

    #[test]
    fn test_status_classification() {
        assert!(EmbeddingError::from_status(429, "slow down").is_retryable());
        assert!(EmbeddingError::from_status(500, "").is_retryable());
        assert!(EmbeddingError::from_status(503, "").is_retryable());
        assert!(!EmbeddingError::from_status(400, "bad input").is_retryable());
        assert!(!EmbeddingError::from_status(401, "").is_retryable());
        assert!(EmbeddingError::Transport("reset".to_string()).is_retryable());
        assert!(!EmbeddingError::MalformedResponse("x".to_string()).is_retryable());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let text = "é".repeat(MAX_EMBED_CHARS);
        let cut = truncate_for_embedding(&text);
        assert!(cut.len() <= MAX_EMBED_CHARS);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_order_response_sorts_by_index() {
        let data = vec![
            EmbedData {
                index: Some(1),
                embedding: vec![0.0, 1.0],
            },
            EmbedData {
                index: Some(0),
                embedding: vec![1.0, 0.0],
            },
        ];
        let vectors = provider(2).order_response(data, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
    }

    #[test]
    fn test_order_response_validates_shape() {
        let data = vec![EmbedData {
            index: None,
            embedding: vec![1.0],
        }];
        assert!(matches!(
            provider(2).order_response(data, 1),
            Err(EmbeddingError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        assert!(matches!(
            provider(2).order_response(Vec::new(), 1),
            Err(EmbeddingError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_request() {
        let result = provider(2)
            .embed_batch(&["  ".to_string()], EmbeddingMode::Query)
            .await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }
}
