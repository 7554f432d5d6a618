//! Error types for the cache stores.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while reading or writing a cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key contains characters that cannot be stored.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Filesystem failure on a specific path.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
