//! Qdrant REST client implementing [`VectorStore`]

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{VectorIndexError, VectorMatch, VectorPoint, VectorStore};
use crate::catalog::{CatalogRecord, StableIdentity};

/// Connection settings for a Qdrant collection
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub struct QdrantVectorStore {
    http: reqwest::Client,
    settings: QdrantSettings,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

impl QdrantVectorStore {
    pub fn new(http: reqwest::Client, settings: QdrantSettings) -> Self {
        Self { http, settings }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.settings.url.trim_end_matches('/'),
            self.settings.collection,
            suffix
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .timeout(self.settings.timeout);
        match &self.settings.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, VectorIndexError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(VectorIndexError::Api { status, body })
    }
}

fn point_body(point: &VectorPoint) -> Result<Value, VectorIndexError> {
    let payload = serde_json::to_value(&point.payload)
        .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
    Ok(json!({
        "id": point.id.to_uuid().hyphenated().to_string(),
        "vector": point.vector,
        "payload": payload,
    }))
}

/// Convert search hits, skipping any whose id or payload cannot be read back
fn parse_matches(response: SearchResponse) -> Vec<VectorMatch> {
    response
        .result
        .into_iter()
        .filter_map(|hit| {
            let id = hit.id.as_str().and_then(StableIdentity::parse);
            let payload = hit
                .payload
                .and_then(|p| serde_json::from_value::<CatalogRecord>(p).ok());
            match (id, payload) {
                (Some(id), Some(payload)) => Some(VectorMatch {
                    id,
                    score: hit.score,
                    payload,
                }),
                _ => {
                    warn!("Skipping unreadable vector store point {}", hit.id);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_index(&self, dimension: usize) -> Result<(), VectorIndexError> {
        let url = self.collection_url("");
        let resp = self.request(reqwest::Method::GET, &url).send().await?;

        if resp.status().is_success() {
            let info: Value = resp
                .json()
                .await
                .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
            let existing = info
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64);
            return match existing {
                Some(size) if size as usize != dimension => Err(VectorIndexError::InvalidDimension {
                    expected: size as usize,
                    actual: dimension,
                }),
                _ => Ok(()),
            };
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            Self::check(resp).await?;
        }

        info!(
            "Creating collection '{}' (dimension {})",
            self.settings.collection, dimension
        );
        let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
        let resp = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), VectorIndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points.iter().map(point_body).collect::<Result<_, _>>()?;

        let url = self.collection_url("/points?wait=true");
        let resp = self
            .request(reqwest::Method::PUT, &url)
            .json(&json!({ "points": points }))
            .send()
            .await?;
        Self::check(resp).await?;
        debug!("Upserted {} points", points.len());
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, VectorIndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let url = self.collection_url("/points/search");
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "vector": vector, "limit": k, "with_payload": true }))
            .send()
            .await?;
        let response: SearchResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;

        Ok(parse_matches(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_body_uses_uuid_id() {
        let payload = CatalogRecord {
            name: "Acme".to_string(),
            primary_tags: "SEO".to_string(),
            ..Default::default()
        };
        let point = VectorPoint {
            id: payload.identity(),
            vector: vec![0.5, 0.5],
            payload,
        };

        let body = point_body(&point).unwrap();
        let id = body["id"].as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(StableIdentity::parse(id), Some(point.id.clone()));
        assert_eq!(body["payload"]["name"], "Acme");
    }

    #[test]
    fn test_parse_matches_skips_unreadable_points() {
        let record = CatalogRecord {
            name: "Acme".to_string(),
            ..Default::default()
        };
        let id = record.identity().to_uuid().hyphenated().to_string();
        let response: SearchResponse = serde_json::from_value(json!({
            "result": [
                { "id": id, "score": 0.8, "payload": { "name": "Acme" } },
                { "id": 7, "score": 0.7, "payload": { "name": "Numeric" } },
                { "id": id, "score": 0.6 }
            ]
        }))
        .unwrap();

        let matches = parse_matches(response);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].payload.name, "Acme");
        assert_eq!(matches[0].id, record.identity());
    }
}
