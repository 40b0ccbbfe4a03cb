use crate::config::Config;
use crate::error::{Result, TeamSearchError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_catalog(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_vector_store(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TeamSearchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_catalog(config: &Config, errors: &mut Vec<ValidationError>) {
        let catalog = &config.catalog;
        match catalog.source.as_str() {
            "file" => {
                if catalog.path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    errors.push(ValidationError::new(
                        "catalog.path",
                        "A file catalog needs a path",
                    ));
                }
            }
            "sheet" => {
                if !catalog.url.as_deref().is_some_and(Self::is_http_url) {
                    errors.push(ValidationError::new(
                        "catalog.url",
                        "A sheet catalog needs an http(s) url",
                    ));
                }
            }
            other => errors.push(ValidationError::new(
                "catalog.source",
                format!("Source must be 'file' or 'sheet', got '{}'", other),
            )),
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if let Some(url) = &embedding.base_url {
            if !Self::is_http_url(url) {
                errors.push(ValidationError::new(
                    "embedding.base_url",
                    format!("Not an http(s) url: {}", url),
                ));
            }
        }

        if embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        for (path, value) in [
            ("embedding.dimension", embedding.dimension),
            ("embedding.batch_size", embedding.batch_size),
            ("embedding.max_concurrent", embedding.max_concurrent),
            ("embedding.cache_max_entries", embedding.cache_max_entries),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }

        if embedding.max_attempts == 0 {
            errors.push(ValidationError::new(
                "embedding.max_attempts",
                "At least one attempt is required",
            ));
        }

        if embedding.base_backoff_ms > embedding.max_backoff_ms {
            errors.push(ValidationError::new(
                "embedding.base_backoff_ms",
                format!(
                    "Base backoff ({}ms) exceeds max backoff ({}ms)",
                    embedding.base_backoff_ms, embedding.max_backoff_ms
                ),
            ));
        }
    }

    fn validate_vector_store(config: &Config, errors: &mut Vec<ValidationError>) {
        let store = &config.vector_store;
        match store.backend.as_str() {
            "hnsw" => {
                for (path, value) in [
                    ("vector_store.hnsw_m", store.hnsw_m),
                    ("vector_store.hnsw_ef_construction", store.hnsw_ef_construction),
                    ("vector_store.hnsw_ef_search", store.hnsw_ef_search),
                    ("vector_store.max_elements", store.max_elements),
                ] {
                    if value == 0 {
                        errors.push(ValidationError::new(path, "Must be greater than 0"));
                    }
                }
            }
            "qdrant" => {
                if !store.url.as_deref().is_some_and(Self::is_http_url) {
                    errors.push(ValidationError::new(
                        "vector_store.url",
                        "The qdrant backend needs an http(s) url",
                    ));
                }
                if store.collection.trim().is_empty() {
                    errors.push(ValidationError::new(
                        "vector_store.collection",
                        "Collection name cannot be empty",
                    ));
                }
            }
            other => errors.push(ValidationError::new(
                "vector_store.backend",
                format!("Backend must be 'hnsw' or 'qdrant', got '{}'", other),
            )),
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if !(1..=50).contains(&retrieval.max_page_size) {
            errors.push(ValidationError::new(
                "retrieval.max_page_size",
                format!("Must be between 1 and 50, got {}", retrieval.max_page_size),
            ));
        }
        if !(1..=100).contains(&retrieval.max_limit) {
            errors.push(ValidationError::new(
                "retrieval.max_limit",
                format!("Must be between 1 and 100, got {}", retrieval.max_limit),
            ));
        }
        if retrieval.pool_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.pool_multiplier",
                "Must be greater than 0",
            ));
        }
        if retrieval.pool_cap < retrieval.max_limit {
            errors.push(ValidationError::new(
                "retrieval.pool_cap",
                "Pool cap must be at least max_limit",
            ));
        }
        if !(0.0..=1.0).contains(&retrieval.diversify_threshold) {
            errors.push(ValidationError::new(
                "retrieval.diversify_threshold",
                format!("Must be between 0.0 and 1.0, got {}", retrieval.diversify_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            errors.push(ValidationError::new(
                "retrieval.mmr_lambda",
                format!("Must be between 0.0 and 1.0, got {}", retrieval.mmr_lambda),
            ));
        }
        if retrieval.weights.phrase_cap < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.weights.phrase_cap",
                "Phrase cap cannot be negative",
            ));
        }
    }

    fn is_http_url(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_sheet_source_needs_url() {
        let mut config = Config::default();
        config.catalog.source = "sheet".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.catalog.url = Some("https://sheets.example.com/values/Teams".to_string());
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        config.vector_store.backend = "faiss".to_string();
        config.retrieval.max_page_size = 80;

        match ConfigValidator::validate(&config) {
            Err(TeamSearchError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec!["embedding.batch_size", "vector_store.backend", "retrieval.max_page_size"]
                );
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_qdrant_backend_needs_url() {
        let mut config = Config::default();
        config.vector_store.backend = "qdrant".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
        config.vector_store.url = Some("http://localhost:6333".to_string());
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
