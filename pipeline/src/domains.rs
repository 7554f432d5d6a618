//! Reading and cleaning the input domain list.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Longest valid host name.
const MAX_DOMAIN_LEN: usize = 253;

/// Read one domain per line. Lines are trimmed; blank lines and lines
/// starting with `#` are skipped.
pub async fn read_domains(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Turns raw user input into a list of unique, valid domains.
#[async_trait]
pub trait DomainCleaner: Send + Sync {
    /// Clean `raw`, keeping first-appearance order.
    async fn clean(&self, raw: &[String]) -> Result<Vec<String>>;
}

/// Local cleaner: canonicalizes URLs and host names, drops invalid ones,
/// and removes duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicDomainCleaner;

impl BasicDomainCleaner {
    /// Canonical form of one input, or `None` when it is not a domain.
    pub fn canonicalize(input: &str) -> Option<String> {
        let lowered = input.trim().to_ascii_lowercase();
        let mut host = lowered.as_str();

        if let Some((_, rest)) = host.split_once("://") {
            host = rest;
        }
        if let Some(end) = host.find(['/', '?', '#']) {
            host = &host[..end];
        }
        if let Some((_, rest)) = host.rsplit_once('@') {
            host = rest;
        }
        if let Some((name, port)) = host.rsplit_once(':')
            && port.chars().all(|c| c.is_ascii_digit())
        {
            host = name;
        }
        host = host.trim_end_matches('.');
        host = host.strip_prefix("www.").unwrap_or(host);

        is_valid_domain(host).then(|| host.to_string())
    }
}

#[async_trait]
impl DomainCleaner for BasicDomainCleaner {
    async fn clean(&self, raw: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut domains = Vec::new();

        for input in raw {
            match Self::canonicalize(input) {
                Some(domain) if seen.insert(domain.clone()) => domains.push(domain),
                Some(domain) => debug!(%domain, "duplicate domain"),
                None => debug!(input = %input, "not a valid domain, skipping"),
            }
        }

        info!(input = raw.len(), unique = domains.len(), "cleaned domain list");
        Ok(domains)
    }
}

fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_DOMAIN_LEN || !host.contains('.') {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
