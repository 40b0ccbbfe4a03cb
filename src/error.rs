use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::embedding::{EmbeddingError, VectorIndexError};

/// Main error type for teamsearch
#[derive(Error, Debug)]
pub enum TeamSearchError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Catalog source could not be read
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector store failure
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorIndexError),

    /// Pagination cursor could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Indexing run finished but some records were not indexed
    #[error("Indexing incomplete: {failed} of {total} records failed")]
    IndexingIncomplete { failed: usize, total: usize },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for teamsearch operations
pub type Result<T> = std::result::Result<T, TeamSearchError>;
