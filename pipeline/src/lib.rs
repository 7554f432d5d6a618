//! # Similarity Pipeline
//!
//! Computes a pairwise similarity matrix for a list of domains:
//!
//! ```text
//! domains.txt ──► DomainCleaner ──► TextSource ──► TextRecord*
//!                                                     │
//!                      SimilarityMatrixBuilder ◄──────┘
//!                        │  filter (len > min_text_length)
//!                        │  CachedEmbedder (cache first, provider on miss)
//!                        │  pairwise cosine similarity
//!                        ▼
//!                  SimilarityMatrix ──► delimited file
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use domsim_pipeline::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::default()).await?;
//! let report = pipeline.run("domains.txt").await?;
//! ```

pub mod config;
pub mod domains;
pub mod error;
pub mod matrix;
pub mod output;
pub mod pipeline;
pub mod source;

pub use config::{CacheConfig, OutputConfig, PipelineConfig, SourceConfig};
pub use domains::{BasicDomainCleaner, DomainCleaner, read_domains};
pub use error::{PipelineError, Result};
pub use matrix::{SimilarityMatrix, SimilarityMatrixBuilder, TextRecord};
pub use output::{render, write_matrix};
pub use pipeline::{Pipeline, RunReport};
pub use source::{HttpTextSource, JsonTextSource, TextSource};
