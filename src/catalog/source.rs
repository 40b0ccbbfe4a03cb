//! Catalog source implementations: JSON file, spreadsheet API, TTL cache

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{records_from_grid, CatalogError, CatalogRecord, CatalogSource};
use crate::cache::{Clock, SystemClock, TtlCache};

/// Spreadsheet export shapes accepted by the catalog readers
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    /// `{"values": [["Name", "Type"], ["Acme", "SEO"]]}`
    Grid { values: Vec<Vec<serde_json::Value>> },
    /// `[{"Name": "Acme", "Type": "SEO"}]`, read in column order
    Rows(Vec<serde_json::Map<String, serde_json::Value>>),
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_document(body: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
    let document: CatalogDocument =
        serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))?;

    let records = match document {
        CatalogDocument::Grid { values } => {
            let grid: Vec<Vec<String>> = values
                .iter()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();
            records_from_grid(&grid)
        }
        CatalogDocument::Rows(rows) => rows
            .iter()
            .map(|row| {
                let cells: Vec<(&str, String)> =
                    row.iter().map(|(k, v)| (k.as_str(), cell_text(v))).collect();
                CatalogRecord::from_row(cells.iter().map(|(k, v)| (*k, v.as_str())))
            })
            .collect(),
    };

    Ok(records)
}

/// Catalog exported to a local JSON file
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn list_records(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let records = parse_document(&body)?;
        tracing::debug!("Loaded {} catalog records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Catalog read from a spreadsheet values endpoint over HTTP
pub struct SheetCatalogSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl SheetCatalogSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl CatalogSource for SheetCatalogSource {
    async fn list_records(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Api { status, body });
        }

        let body = resp.text().await?;
        let records = parse_document(&body)?;
        tracing::debug!("Fetched {} catalog records", records.len());
        Ok(records)
    }
}

/// Serves the last successful listing of `inner` for `ttl`
pub struct CachedCatalogSource<S> {
    inner: S,
    cache: TtlCache<(), Arc<Vec<CatalogRecord>>>,
}

impl<S: CatalogSource> CachedCatalogSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: TtlCache::with_clock(1, ttl, clock),
        }
    }

    /// Drop the cached listing so the next call reads through
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl<S: CatalogSource> CatalogSource for CachedCatalogSource<S> {
    async fn list_records(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        if let Some(records) = self.cache.get(&()) {
            tracing::debug!("Catalog cache hit ({} records)", records.len());
            return Ok(records.as_ref().clone());
        }

        let records = self.inner.list_records().await?;
        self.cache.insert((), Arc::new(records.clone()));
        Ok(records)
    }
}
