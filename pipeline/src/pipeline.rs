//! End-to-end similarity run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use domsim_cache::FilesystemStore;
use domsim_embeddings::{CachedEmbedder, EmbeddingStats, OpenAIProvider};
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, SourceConfig};
use crate::domains::{BasicDomainCleaner, DomainCleaner, read_domains};
use crate::error::Result;
use crate::matrix::{SimilarityMatrix, SimilarityMatrixBuilder, TextRecord};
use crate::output::write_matrix;
use crate::source::{HttpTextSource, JsonTextSource, TextSource};

/// Reads domains, resolves their texts and embeddings, and writes the
/// similarity matrix.
pub struct Pipeline {
    config: PipelineConfig,
    cleaner: Arc<dyn DomainCleaner>,
    source: Arc<dyn TextSource>,
    embedder: Arc<CachedEmbedder>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        config: PipelineConfig,
        cleaner: Arc<dyn DomainCleaner>,
        source: Arc<dyn TextSource>,
        embedder: Arc<CachedEmbedder>,
    ) -> Self {
        Self {
            config,
            cleaner,
            source,
            embedder,
        }
    }

    /// Wire the default collaborators described by `config`: filesystem
    /// caches, the OpenAI provider, and the configured text source.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let embedding_store = Arc::new(FilesystemStore::open(&config.cache.embeddings_dir).await?);
        let provider = OpenAIProvider::new(config.provider.clone())?;
        if !provider.is_available() {
            warn!("no embedding API key configured; only cached embeddings can be served");
        }
        let embedder = Arc::new(
            CachedEmbedder::new(Arc::new(provider), embedding_store)
                .with_key_policy(config.key_policy),
        );

        let source: Arc<dyn TextSource> = match &config.source {
            SourceConfig::Json { path } => Arc::new(JsonTextSource::load(path).await?),
            SourceConfig::Http {
                url_template,
                api_key,
                timeout_secs,
            } => {
                let responses =
                    Arc::new(FilesystemStore::open(&config.cache.responses_dir).await?);
                Arc::new(
                    HttpTextSource::new(
                        url_template.clone(),
                        api_key.clone(),
                        Duration::from_secs(*timeout_secs),
                    )?
                    .with_cache(responses),
                )
            }
        };

        Ok(Self::new(
            config,
            Arc::new(BasicDomainCleaner),
            source,
            embedder,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch text for each domain, keeping input order. Domains without
    /// text are left out.
    pub async fn collect_records(&self, domains: &[String]) -> Result<Vec<TextRecord>> {
        let source = self.source.as_ref();
        let mut fetched = stream::iter(domains)
            .map(|domain| async move { (domain, source.fetch_text(domain).await) })
            .buffered(self.config.concurrency.max(1));

        let mut records = Vec::with_capacity(domains.len());
        while let Some((domain, text)) = fetched.next().await {
            match text? {
                Some(text) => records.push(TextRecord::new(domain.clone(), text)),
                None => debug!(%domain, "no text available, skipping"),
            }
        }
        Ok(records)
    }

    /// Build the similarity matrix for `records` with the configured
    /// threshold, model and concurrency.
    pub async fn build_matrix(&self, records: &[TextRecord]) -> Result<SimilarityMatrix> {
        SimilarityMatrixBuilder::new(self.config.min_text_length, self.config.model.clone())
            .with_concurrency(self.config.concurrency)
            .with_isolated_failures(self.config.isolate_failures)
            .build(records, &self.embedder)
            .await
    }

    /// Run the whole pipeline on the domain list at `domains_path`.
    ///
    /// The output file is written only after the full matrix is built.
    pub async fn run(&self, domains_path: impl AsRef<Path>) -> Result<RunReport> {
        let started = Instant::now();
        let stats_before = self.embedder.stats();

        let raw = read_domains(domains_path).await?;
        let domains = self.cleaner.clean(&raw).await?;
        let records = self.collect_records(&domains).await?;
        let matrix = self.build_matrix(&records).await?;
        write_matrix(&matrix, &self.config.output).await?;

        let stats_after = self.embedder.stats();
        let report = RunReport {
            domains_read: raw.len(),
            domains_unique: domains.len(),
            records: records.len(),
            entities: matrix.len(),
            embeddings: EmbeddingStats {
                provider_calls: stats_after.provider_calls - stats_before.provider_calls,
                cache_hits: stats_after.cache_hits - stats_before.cache_hits,
            },
            output: self.config.output.path.clone(),
            elapsed: started.elapsed(),
        };
        info!(
            entities = report.entities,
            provider_calls = report.embeddings.provider_calls,
            cache_hits = report.embeddings.cache_hits,
            "similarity run complete"
        );
        Ok(report)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Lines read from the domain list.
    pub domains_read: usize,

    /// Domains left after cleaning.
    pub domains_unique: usize,

    /// Domains for which text was found.
    pub records: usize,

    /// Entities in the written matrix.
    pub entities: usize,

    /// How embeddings were served during this run.
    pub embeddings: EmbeddingStats,

    /// Path of the written matrix.
    pub output: PathBuf,

    /// Wall-clock duration.
    pub elapsed: Duration,
}
