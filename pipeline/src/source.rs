//! Sources of descriptive text for each domain.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domsim_cache::{CacheKey, KeyValueStore};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Cache namespace for text-service responses.
const RESPONSE_NAMESPACE: &str = "text-source";

/// Provides the text describing a domain.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Text for `domain`, or `None` when the source knows nothing about it.
    async fn fetch_text(&self, domain: &str) -> Result<Option<String>>;
}

/// Texts read from a JSON object of `{"domain": "text"}`.
#[derive(Debug, Clone, Default)]
pub struct JsonTextSource {
    texts: HashMap<String, String>,
}

impl JsonTextSource {
    /// Load texts from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let texts: HashMap<String, String> = serde_json::from_slice(&content)?;
        info!("Loaded {} texts from {}", texts.len(), path.display());
        Ok(Self { texts })
    }

    /// Build from an in-memory map.
    pub fn from_map(texts: HashMap<String, String>) -> Self {
        Self { texts }
    }
}

#[async_trait]
impl TextSource for JsonTextSource {
    async fn fetch_text(&self, domain: &str) -> Result<Option<String>> {
        Ok(self.texts.get(domain).cloned())
    }
}

/// Body returned by the text service.
#[derive(Debug, Deserialize)]
struct TextResponse {
    text: Option<String>,
}

/// Texts fetched from an HTTP service, one GET per domain.
///
/// Successful response bodies are stored in a content-addressed cache
/// keyed by request URL, so repeated runs do not re-query the service.
pub struct HttpTextSource {
    client: reqwest::Client,
    url_template: String,
    api_key: Option<String>,
    cache: Option<Arc<dyn KeyValueStore>>,
}

impl HttpTextSource {
    /// Create a source for a URL template containing `{domain}`.
    pub fn new(
        url_template: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            api_key,
            cache: None,
        })
    }

    /// Cache response bodies in `store`.
    pub fn with_cache(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cache = Some(store);
        self
    }

    fn url_for(&self, domain: &str) -> String {
        self.url_template
            .replace("{domain}", &urlencoding::encode(domain))
    }

    fn parse(domain: &str, body: &[u8]) -> Result<Option<String>> {
        let response: TextResponse =
            serde_json::from_slice(body).map_err(|e| PipelineError::Source {
                domain: domain.to_string(),
                reason: format!("malformed response: {e}"),
            })?;
        Ok(response.text)
    }

    async fn request(&self, domain: &str, url: &str) -> Result<Option<Vec<u8>>> {
        let mut request = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| PipelineError::Source {
            domain: domain.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(%domain, "text source has no entry");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Source {
                domain: domain.to_string(),
                reason: format!("status {status}: {body}"),
            });
        }

        let body = response.bytes().await.map_err(|e| PipelineError::Source {
            domain: domain.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(body.to_vec()))
    }
}

#[async_trait]
impl TextSource for HttpTextSource {
    async fn fetch_text(&self, domain: &str) -> Result<Option<String>> {
        let url = self.url_for(domain);
        let key = CacheKey::derive(RESPONSE_NAMESPACE, [url.as_str()]);

        if let Some(cache) = &self.cache
            && let Some(body) = cache.get(&key).await?
        {
            match Self::parse(domain, &body) {
                Ok(text) => {
                    debug!(%domain, %key, "text source cache hit");
                    return Ok(text);
                }
                Err(e) => warn!(%domain, %key, error = %e, "unreadable cached response, refetching"),
            }
        }

        let Some(body) = self.request(domain, &url).await? else {
            return Ok(None);
        };
        let text = Self::parse(domain, &body)?;

        if let Some(cache) = &self.cache {
            cache.put(&key, &body).await?;
        }
        Ok(text)
    }
}
