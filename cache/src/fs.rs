//! Filesystem-backed store: one file per key under a root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::KeyValueStore;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

/// Stores each payload in `<root>/<key>`.
///
/// Writes go to a uniquely named temporary file in the same directory,
/// are flushed to disk, then renamed over the final path. Readers never
/// observe a half-written payload, and concurrent writers of the same key
/// simply race to rename identical bytes.
#[derive(Debug)]
pub struct FilesystemStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;

        info!("Opened cache store at {}", root.display());
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path at which `key` is (or would be) stored.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn tmp_path_for(&self, key: &CacheKey) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{key}.{}.{n}.tmp", std::process::id()))
    }
}

#[async_trait]
impl KeyValueStore for FilesystemStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    async fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = self.tmp_path_for(key);

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| CacheError::io(&tmp_path, e))?;
        let written = async {
            file.write_all(value).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::io(&tmp_path, e));
        }

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::io(&path, e));
        }

        debug!(%key, bytes = value.len(), "stored cache entry");
        Ok(())
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path_for(key);
        fs::try_exists(&path)
            .await
            .map_err(|e| CacheError::io(path, e))
    }
}
