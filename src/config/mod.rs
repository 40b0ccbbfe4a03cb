//! Configuration management for teamsearch
//!
//! Loaded from TOML, then overridden from `TEAMSEARCH_SECTION__KEY`
//! environment variables, then validated as a whole. Secrets never live in
//! the file; it names the environment variables that hold them.

use crate::error::{Result, TeamSearchError};
use crate::retrieval::{DiversifyConfig, FusionWeights, PoolSizing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

const ENV_PREFIX: &str = "TEAMSEARCH_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub catalog: CatalogConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where catalog rows are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// "file" or "sheet"
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub cache_ttl_secs: u64,
}

/// Embedding provider and client policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible endpoint; search is disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub query_prefix: String,
    pub passage_prefix: String,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 0 disables hedging
    pub hedge_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
}

/// Vector store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// "hnsw" (local) or "qdrant"
    pub backend: String,
    /// Snapshot file of the local index
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub max_elements: usize,
}

/// Ranking and paging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_page_size: usize,
    pub max_limit: usize,
    pub pool_multiplier: usize,
    pub pool_cap: usize,
    pub diversify_top_n: usize,
    pub diversify_threshold: f32,
    pub mmr_k: usize,
    pub mmr_lambda: f32,
    pub weights: FusionWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_page_size: 50,
            max_limit: 100,
            pool_multiplier: 3,
            pool_cap: 1000,
            diversify_top_n: 8,
            diversify_threshold: 0.55,
            mmr_k: 20,
            mmr_lambda: 0.7,
            weights: FusionWeights::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn pool_sizing(&self) -> PoolSizing {
        PoolSizing {
            multiplier: self.pool_multiplier.max(1),
            cap: self.pool_cap,
        }
    }

    pub fn diversify_config(&self) -> DiversifyConfig {
        DiversifyConfig {
            top_n: self.diversify_top_n,
            threshold: self.diversify_threshold,
            k: self.mmr_k,
            lambda: self.mmr_lambda,
        }
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| TeamSearchError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TeamSearchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TeamSearchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `path`, falling back to (env-overridden) defaults when it is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TeamSearchError::ConfigNotFound { path }) => {
                tracing::warn!("No config at {}; using defaults", path.display());
                let mut config = Config::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TeamSearchError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TeamSearchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TEAMSEARCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `TEAMSEARCH_`-prefixed overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let optional = |v: &str| (!v.trim().is_empty()).then(|| v.to_string());

        match path {
            "CATALOG__SOURCE" => self.catalog.source = value.to_string(),
            "CATALOG__PATH" => self.catalog.path = optional(value).map(PathBuf::from),
            "CATALOG__URL" => self.catalog.url = optional(value),
            "CATALOG__API_KEY_ENV" => self.catalog.api_key_env = optional(value),
            "CATALOG__CACHE_TTL_SECS" => self.catalog.cache_ttl_secs = parse_value(path, value)?,
            "EMBEDDING__BASE_URL" => self.embedding.base_url = optional(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_value(path, value)?,
            "EMBEDDING__API_KEY_ENV" => self.embedding.api_key_env = optional(value),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "EMBEDDING__MAX_CONCURRENT" => {
                self.embedding.max_concurrent = parse_value(path, value)?
            }
            "EMBEDDING__TIMEOUT_SECS" => self.embedding.timeout_secs = parse_value(path, value)?,
            "EMBEDDING__MAX_ATTEMPTS" => self.embedding.max_attempts = parse_value(path, value)?,
            "EMBEDDING__HEDGE_DELAY_MS" => {
                self.embedding.hedge_delay_ms = parse_value(path, value)?
            }
            "VECTOR_STORE__BACKEND" => self.vector_store.backend = value.to_string(),
            "VECTOR_STORE__PATH" => self.vector_store.path = PathBuf::from(value),
            "VECTOR_STORE__URL" => self.vector_store.url = optional(value),
            "VECTOR_STORE__COLLECTION" => self.vector_store.collection = value.to_string(),
            "VECTOR_STORE__API_KEY_ENV" => self.vector_store.api_key_env = optional(value),
            "RETRIEVAL__MAX_PAGE_SIZE" => self.retrieval.max_page_size = parse_value(path, value)?,
            "RETRIEVAL__MAX_LIMIT" => self.retrieval.max_limit = parse_value(path, value)?,
            "RETRIEVAL__POOL_CAP" => self.retrieval.pool_cap = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TeamSearchError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("teamsearch").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TeamSearchError::Config("Cannot determine data directory".to_string()))?;

        Ok(data_dir.join("teamsearch"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir =
            Self::default_data_dir().unwrap_or_else(|_| PathBuf::from(".teamsearch"));

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            catalog: CatalogConfig {
                source: "file".to_string(),
                path: Some(data_dir.join("catalog.json")),
                url: None,
                api_key_env: None,
                cache_ttl_secs: 300,
            },
            embedding: EmbeddingConfig {
                base_url: None,
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                api_key_env: Some("TEAMSEARCH_EMBEDDING_API_KEY".to_string()),
                query_prefix: "query: ".to_string(),
                passage_prefix: "passage: ".to_string(),
                batch_size: 32,
                max_concurrent: 4,
                timeout_secs: 30,
                max_attempts: 4,
                base_backoff_ms: 250,
                max_backoff_ms: 4000,
                hedge_delay_ms: 400,
                cache_ttl_secs: 300,
                cache_max_entries: 512,
            },
            vector_store: VectorStoreConfig {
                backend: "hnsw".to_string(),
                path: data_dir.join("vectors.json"),
                url: None,
                collection: "teams".to_string(),
                api_key_env: None,
                timeout_secs: 30,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                max_elements: 10_000,
            },
            retrieval: RetrievalConfig::default(),
        }
    }
}
