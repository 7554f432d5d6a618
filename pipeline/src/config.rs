//! Configuration for a similarity run.

use std::path::{Path, PathBuf};

use domsim_embeddings::{DEFAULT_MODEL, KeyPolicy, OpenAIConfig};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Configuration for one similarity-matrix run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Texts must be strictly longer than this (in characters) to be kept.
    pub min_text_length: usize,

    /// Embedding model identifier; part of every cache key.
    pub model: String,

    /// Which text the embedding cache key is derived from.
    pub key_policy: KeyPolicy,

    /// Number of embeddings resolved concurrently. 1 is fully sequential.
    pub concurrency: usize,

    /// Drop entities whose provider call fails instead of aborting the run.
    pub isolate_failures: bool,

    /// Cache locations.
    pub cache: CacheConfig,

    /// Embedding provider connection.
    pub provider: OpenAIConfig,

    /// Where entity texts come from.
    pub source: SourceConfig,

    /// Where and how the matrix is written.
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing fields take defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("model must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if let SourceConfig::Http { url_template, .. } = &self.source
            && !url_template.contains("{domain}")
        {
            return Err(PipelineError::Config(format!(
                "text source url template {url_template:?} has no {{domain}} placeholder"
            )));
        }
        if matches!(self.output.delimiter, '"' | '\n' | '\r') {
            return Err(PipelineError::Config(format!(
                "unusable output delimiter {:?}",
                self.output.delimiter
            )));
        }
        Ok(())
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the minimum text length.
    pub fn with_min_text_length(mut self, min_text_length: usize) -> Self {
        self.min_text_length = min_text_length;
        self
    }

    /// Set the embedding concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the text source.
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    /// Set the output path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.path = path.into();
        self
    }

    /// Put both cache namespaces under one directory.
    pub fn with_cache_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.cache.embeddings_dir = root.join(".openai");
        self.cache.responses_dir = root.join(".apicache");
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_text_length: 100,
            model: DEFAULT_MODEL.to_string(),
            key_policy: KeyPolicy::default(),
            concurrency: 1,
            isolate_failures: false,
            cache: CacheConfig::default(),
            provider: OpenAIConfig::default(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Cache directories, one per cache role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Embedding vectors.
    pub embeddings_dir: PathBuf,

    /// Upstream text-service responses.
    pub responses_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embeddings_dir: PathBuf::from(".openai"),
            responses_dir: PathBuf::from(".apicache"),
        }
    }
}

/// Where entity texts come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A JSON object mapping domain to text.
    Json { path: PathBuf },

    /// An HTTP service returning `{"text": ...}` for each domain.
    Http {
        /// URL with a `{domain}` placeholder.
        url_template: String,

        /// Bearer credential, passed through unchanged.
        #[serde(default, skip_serializing)]
        api_key: Option<String>,

        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Json {
            path: PathBuf::from("texts.json"),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Output settings for the matrix file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination file.
    pub path: PathBuf,

    /// Field delimiter.
    pub delimiter: char,

    /// Fixed number of decimals. `None` writes the shortest text that
    /// reads back to the exact same `f64`.
    pub precision: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("out/similarity_matrix.csv"),
            delimiter: ',',
            precision: None,
        }
    }
}
