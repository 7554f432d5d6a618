//! Error types for the embeddings system.

use domsim_cache::{CacheError, CacheKey};
use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed with status {status}: {body}")]
    ApiRequest { status: u16, body: String },

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A provider failure while filling a specific cache entry.
    #[error("provider failed for cache key {key}: {source}")]
    Provider {
        key: CacheKey,
        #[source]
        source: Box<EmbeddingError>,
    },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Zero-norm vector; cosine similarity is undefined.
    #[error("degenerate vector: embedding has zero norm")]
    DegenerateVector,

    /// A stored payload that cannot be decoded. Deleting the file named by
    /// `key` from the cache directory invalidates it.
    #[error("corrupt cache entry {key}: {reason}")]
    CacheCorruption { key: CacheKey, reason: String },

    /// Cache store error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EmbeddingError {
    /// Whether this error came from the remote provider (network, auth,
    /// quota, malformed response) rather than from local state.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotConfigured
                | Self::ApiRequest { .. }
                | Self::InvalidResponse(_)
                | Self::RateLimited { .. }
                | Self::Http(_)
                | Self::Provider { .. }
        )
    }

    /// Cache key involved in this error, if any.
    pub fn cache_key(&self) -> Option<&CacheKey> {
        match self {
            Self::Provider { key, .. } | Self::CacheCorruption { key, .. } => Some(key),
            _ => None,
        }
    }
}
