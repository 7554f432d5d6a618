//! Error types for the similarity pipeline.

use std::path::PathBuf;

use domsim_cache::CacheError;
use domsim_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or writing a similarity matrix.
///
/// Every variant aborts the run; none is retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Resolving an entity's embedding failed. The source names the cache
    /// key where one is involved.
    #[error("embedding failed for {entity}: {source}")]
    Embedding {
        entity: String,
        #[source]
        source: EmbeddingError,
    },

    /// An entity's embedding length differs from the rest of the run.
    #[error("dimension mismatch for {entity}: expected {expected}, got {actual}")]
    DimensionMismatch {
        entity: String,
        expected: usize,
        actual: usize,
    },

    /// An entity's embedding has zero norm.
    #[error("degenerate (zero-norm) embedding for {entity}")]
    DegenerateVector { entity: String },

    /// The upstream text service failed for a domain.
    #[error("text source failed for {domain}: {reason}")]
    Source { domain: String, reason: String },

    /// Setting up the embedder failed.
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbeddingError),

    /// Cache store error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error on a specific path.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The entity this error is about, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::Embedding { entity, .. }
            | Self::DimensionMismatch { entity, .. }
            | Self::DegenerateVector { entity } => Some(entity),
            Self::Source { domain, .. } => Some(domain),
            _ => None,
        }
    }
}
