//! Encoding of embeddings as cache payloads.
//!
//! Payloads are JSON arrays of numbers, so cache files stay readable and
//! are compatible with entries written by other tools that store the raw
//! provider vector.

use domsim_cache::CacheKey;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Serialize an embedding for storage.
pub fn encode(embedding: &[f32]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(embedding)?)
}

/// Decode a stored payload, reporting any problem as corruption of `key`.
pub fn decode(key: &CacheKey, bytes: &[u8]) -> Result<Embedding> {
    let embedding: Embedding =
        serde_json::from_slice(bytes).map_err(|e| EmbeddingError::CacheCorruption {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    if embedding.is_empty() {
        return Err(EmbeddingError::CacheCorruption {
            key: key.clone(),
            reason: "empty embedding".to_string(),
        });
    }
    // Numbers outside the f32 range parse as infinity.
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(EmbeddingError::CacheCorruption {
            key: key.clone(),
            reason: "embedding contains non-finite values".to_string(),
        });
    }

    Ok(embedding)
}
