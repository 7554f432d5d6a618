//! # Cache
//!
//! Durable, content-addressed storage for the results of costly calls
//! (embedding requests, upstream API responses).
//!
//! A [`CacheKey`] is a deterministic function of the logical input of a
//! call, so a value written under a key never needs to change: writing the
//! same key twice writes the same bytes.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ CacheKey::derive(namespace, parts)           │
//! │            │                                 │
//! │            ▼                                 │
//! │    KeyValueStore ──► FilesystemStore (disk)  │
//! │                  └─► MemoryStore (process)   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod fs;
pub mod key;
pub mod memory;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use fs::FilesystemStore;
pub use key::CacheKey;
pub use memory::MemoryStore;

/// A key/value byte store addressed by [`CacheKey`].
///
/// A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the payload stored under `key`.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`. The write is durable once this returns.
    async fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()>;

    /// Whether a payload exists for `key`.
    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
