//! Command-line arguments and how they override file configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use domsim_embeddings::KeyPolicy;
use domsim_pipeline::{PipelineConfig, SourceConfig};

#[derive(Parser, Debug)]
#[command(name = "domsim", version)]
#[command(about = "Pairwise text similarity between domains")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the similarity matrix for a domain list.
    Run(RunArgs),

    /// Print the embedding cache key for a text, e.g. to delete a corrupt entry.
    Key(KeyArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file. Flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File with one domain per line.
    #[arg(long, default_value = "domains.txt")]
    pub domains: PathBuf,

    /// JSON object mapping domain to text.
    #[arg(long, conflicts_with = "text_url")]
    pub texts: Option<PathBuf>,

    /// Text service URL with a `{domain}` placeholder.
    #[arg(long)]
    pub text_url: Option<String>,

    /// Bearer token for the text service.
    #[arg(long, env = "TEXT_API_KEY", hide_env_values = true)]
    pub text_api_key: Option<String>,

    /// Embedding provider API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embedding provider base URL.
    #[arg(long)]
    pub openai_base_url: Option<String>,

    /// Embedding model identifier.
    #[arg(long)]
    pub model: Option<String>,

    /// Keep only texts longer than this many characters.
    #[arg(long)]
    pub min_text_length: Option<usize>,

    /// Embeddings resolved concurrently.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Drop entities whose provider call fails instead of aborting.
    #[arg(long, overrides_with = "no_isolate_failures")]
    pub isolate_failures: bool,

    /// Abort on the first provider failure, even if the config file says otherwise.
    #[arg(long, overrides_with = "isolate_failures")]
    pub no_isolate_failures: bool,

    /// Derive cache keys from the raw text instead of the normalized text.
    #[arg(long, overrides_with = "no_raw_cache_keys")]
    pub raw_cache_keys: bool,

    /// Derive cache keys from the normalized text, even if the config file says otherwise.
    #[arg(long, overrides_with = "raw_cache_keys")]
    pub no_raw_cache_keys: bool,

    /// Directory holding the `.openai` and `.apicache` caches.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Output file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Fixed number of decimals in the output.
    #[arg(long)]
    pub precision: Option<usize>,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Embedding model identifier.
    #[arg(long, default_value = domsim_embeddings::DEFAULT_MODEL)]
    pub model: String,

    /// Derive the key from the raw text.
    #[arg(long)]
    pub raw: bool,

    /// Text to hash; read from stdin when omitted.
    pub text: Option<String>,
}

impl RunArgs {
    /// Load the configuration file (or defaults) and apply flag overrides.
    pub fn to_config(&self) -> domsim_pipeline::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(min_text_length) = self.min_text_length {
            config.min_text_length = min_text_length;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(isolate) = switch(self.isolate_failures, self.no_isolate_failures) {
            config.isolate_failures = isolate;
        }
        if let Some(raw) = switch(self.raw_cache_keys, self.no_raw_cache_keys) {
            config.key_policy = if raw {
                KeyPolicy::Raw
            } else {
                KeyPolicy::Normalized
            };
        }
        if let Some(cache_dir) = &self.cache_dir {
            *config = config.clone().with_cache_root(cache_dir);
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if self.precision.is_some() {
            config.output.precision = self.precision;
        }

        if let Some(key) = &self.openai_api_key {
            config.provider.api_key = Some(key.clone());
        }
        if let Some(url) = &self.openai_base_url {
            config.provider.base_url = url.clone();
        }

        if let Some(path) = &self.texts {
            config.source = SourceConfig::Json { path: path.clone() };
        } else if let Some(url_template) = &self.text_url {
            config.source = SourceConfig::Http {
                url_template: url_template.clone(),
                api_key: None,
                timeout_secs: 30,
            };
        }
        if let SourceConfig::Http { api_key, .. } = &mut config.source
            && let Some(key) = &self.text_api_key
        {
            *api_key = Some(key.clone());
        }
    }
}

/// Resolve a `--flag` / `--no-flag` pair; `None` keeps the configured value.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
