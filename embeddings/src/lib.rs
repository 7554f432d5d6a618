//! # Embeddings
//!
//! Turns text into dense vectors through a paid provider while paying for
//! each distinct input at most once, and compares vectors by cosine
//! similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CachedEmbedder ──► KeyValueStore (hit)                         │
//! │       │                                                         │
//! │       └─(miss)──► EmbeddingProvider ──► codec ──► put           │
//! │                                                                 │
//! │  similarity: cosine_similarity / norm / dot_product             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod codec;
pub mod error;
pub mod provider;
pub mod similarity;

pub use cache::{CachedEmbedder, EmbeddingStats, KeyPolicy, normalize_text};
pub use error::{EmbeddingError, Result};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIConfig, OpenAIProvider,
};
pub use similarity::{cosine_similarity, dot_product, norm};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";
