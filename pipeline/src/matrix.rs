//! Similarity matrix assembly.

use std::collections::HashSet;

use domsim_embeddings::{CachedEmbedder, Embedding, cosine_similarity, norm};
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// An entity identifier paired with its descriptive text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub entity: String,
    pub text: String,
}

impl TextRecord {
    pub fn new(entity: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            text: text.into(),
        }
    }

    /// Text length in characters.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Square, symmetric matrix of cosine similarities, indexed by entity on
/// both axes in the order the entities were kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    labels: Vec<String>,
    /// Row-major, `labels.len()` squared.
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// A matrix with no rows or columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entity identifiers, in row (and column) order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Similarity at row `i`, column `j`.
    pub fn value_at(&self, i: usize, j: usize) -> Option<f64> {
        let n = self.len();
        if i < n && j < n {
            Some(self.values[i * n + j])
        } else {
            None
        }
    }

    /// Similarity between two entities.
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.position(row)?;
        let j = self.position(col)?;
        self.value_at(i, j)
    }

    /// All similarities of one entity, in column order.
    pub fn row(&self, entity: &str) -> Option<&[f64]> {
        let n = self.len();
        let i = self.position(entity)?;
        Some(&self.values[i * n..(i + 1) * n])
    }

    /// Iterate rows as `(entity, similarities)`.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[f64])> {
        let n = self.len().max(1);
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.chunks(n))
    }

    fn position(&self, entity: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == entity)
    }

    /// Compute the matrix for already-resolved embeddings.
    ///
    /// All embeddings must share one dimension and have a finite, non-zero
    /// norm.
    /// The diagonal is exactly 1.0 and `M[i][j]` is bit-identical to
    /// `M[j][i]`.
    pub fn from_embeddings(rows: Vec<(String, Embedding)>) -> Result<Self> {
        let Some(expected) = rows.first().map(|(_, v)| v.len()) else {
            return Ok(Self::empty());
        };

        for (entity, embedding) in &rows {
            if embedding.len() != expected {
                return Err(PipelineError::DimensionMismatch {
                    entity: entity.clone(),
                    expected,
                    actual: embedding.len(),
                });
            }
            let length = norm(embedding);
            if length == 0.0 || !length.is_finite() {
                return Err(PipelineError::DegenerateVector {
                    entity: entity.clone(),
                });
            }
        }

        let n = rows.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let sim = cosine_similarity(&rows[i].1, &rows[j].1).map_err(|source| {
                    PipelineError::Embedding {
                        entity: rows[j].0.clone(),
                        source,
                    }
                })?;
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }

        Ok(Self {
            labels: rows.into_iter().map(|(entity, _)| entity).collect(),
            values,
        })
    }
}

/// Builds a [`SimilarityMatrix`] from text records.
#[derive(Debug, Clone)]
pub struct SimilarityMatrixBuilder {
    min_text_length: usize,
    model: String,
    concurrency: usize,
    isolate_failures: bool,
}

impl SimilarityMatrixBuilder {
    /// Sequential builder keeping texts longer than `min_text_length`.
    pub fn new(min_text_length: usize, model: impl Into<String>) -> Self {
        Self {
            min_text_length,
            model: model.into(),
            concurrency: 1,
            isolate_failures: false,
        }
    }

    /// Resolve up to `concurrency` embeddings at a time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Drop entities whose provider call fails instead of aborting.
    pub fn with_isolated_failures(mut self, isolate: bool) -> Self {
        self.isolate_failures = isolate;
        self
    }

    /// Keep records whose text is strictly longer than the threshold,
    /// preserving input order. Later duplicates of an entity are dropped.
    pub fn filter<'a>(&self, records: &'a [TextRecord]) -> Vec<&'a TextRecord> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for record in records {
            if !seen.insert(record.entity.as_str()) {
                warn!(entity = %record.entity, "duplicate entity, keeping first occurrence");
                continue;
            }
            if record.text_len() > self.min_text_length {
                kept.push(record);
            } else {
                debug!(
                    entity = %record.entity,
                    len = record.text_len(),
                    "text too short, skipping"
                );
            }
        }
        kept
    }

    /// Filter, embed, and compare `records`.
    pub async fn build(
        &self,
        records: &[TextRecord],
        embedder: &CachedEmbedder,
    ) -> Result<SimilarityMatrix> {
        let kept = self.filter(records);
        info!(
            records = records.len(),
            kept = kept.len(),
            min_text_length = self.min_text_length,
            "filtered records"
        );

        let embeddings = self.embed_all(&kept, embedder).await?;
        SimilarityMatrix::from_embeddings(embeddings)
    }

    async fn embed_all(
        &self,
        kept: &[&TextRecord],
        embedder: &CachedEmbedder,
    ) -> Result<Vec<(String, Embedding)>> {
        let model = self.model.as_str();
        let mut resolved = stream::iter(kept.iter().copied())
            .map(|record| async move { (record, embedder.embed(model, &record.text).await) })
            .buffered(self.concurrency);

        let mut embeddings = Vec::with_capacity(kept.len());
        let mut dropped = Vec::new();
        while let Some((record, result)) = resolved.next().await {
            match result {
                Ok(embedding) => embeddings.push((record.entity.clone(), embedding)),
                Err(e) if self.isolate_failures && e.is_provider_error() => {
                    warn!(entity = %record.entity, error = %e, "dropping entity after provider failure");
                    dropped.push(record.entity.clone());
                }
                Err(source) => {
                    return Err(PipelineError::Embedding {
                        entity: record.entity.clone(),
                        source,
                    });
                }
            }
        }

        if !dropped.is_empty() {
            warn!(?dropped, "entities dropped after provider failures");
        }
        Ok(embeddings)
    }
}
