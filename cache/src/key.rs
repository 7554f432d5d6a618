//! Deterministic cache key derivation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Longest readable namespace prefix kept in a key.
const MAX_PREFIX_LEN: usize = 64;

/// Longest key accepted by [`CacheKey::parse`].
const MAX_KEY_LEN: usize = 200;

/// A content address: `<namespace>_<sha256 hex>`.
///
/// The digest covers the namespace and every part, each prefixed with its
/// length, so `("ab", "c")` and `("a", "bc")` never collide. The readable
/// prefix is a sanitized copy of the namespace and carries no identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from a namespace (e.g. a model identifier) and the
    /// exact bytes of the call's inputs.
    pub fn derive<I, P>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, namespace.as_bytes());
        for part in parts {
            update_framed(&mut hasher, part.as_ref());
        }
        let digest = hasher.finalize();

        Self(format!("{}_{digest:x}", sanitize_prefix(namespace)))
    }

    /// Accept an existing key string, rejecting anything that is not safe
    /// to use as a single path component.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_KEY_LEN
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if valid {
            Ok(Self(raw))
        } else {
            Err(CacheError::InvalidKey(raw))
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn sanitize_prefix(namespace: &str) -> String {
    let mut prefix: String = namespace
        .chars()
        .take(MAX_PREFIX_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if prefix.is_empty() || prefix.starts_with('.') {
        prefix.insert(0, 'k');
    }
    prefix
}
