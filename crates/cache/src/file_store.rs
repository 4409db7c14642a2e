//! File-based cache store — one JSON document per cache key.
//!
//! Storage location: `~/.roundgate/cache/rounds/<key>.json` by default.
//!
//! Writes go to a uniquely named temp file in the same directory and are
//! then renamed over the target, so a reader never observes a partially
//! written entry and two writers for the same key cannot interleave.

use async_trait::async_trait;
use roundgate_core::CacheKey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::store::{CacheEntry, CacheError, CacheStore};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// A directory of JSON cache entries.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File cache store opened");
        Self { dir }
    }

    /// Default location: `~/.roundgate/cache/rounds`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".roundgate")
            .join("cache")
            .join("rounds")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        self.files_with_extensions(&[ENTRY_EXTENSION]).await
    }

    async fn files_with_extensions(&self, extensions: &[&str]) -> Result<Vec<PathBuf>, CacheError> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| extensions.iter().any(|wanted| ext == *wanted))
            {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if &entry.key != key {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                reason: format!("entry is stored under key {}", entry.key),
            });
        }
        Ok(Some(entry))
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec(entry)?;
        let target = self.entry_path(&entry.key);
        let tmp = self
            .dir
            .join(format!("{}.{}.{TEMP_EXTENSION}", entry.key.as_str(), Uuid::new_v4()));

        let written = match tokio::fs::write(&tmp, &json).await {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // A failed write may still have left a partial temp file.
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entry_files().await?.len())
    }

    /// Removes every entry, plus temp files orphaned by an interrupted write.
    async fn clear(&self) -> Result<(), CacheError> {
        let files = self
            .files_with_extensions(&[ENTRY_EXTENSION, TEMP_EXTENSION])
            .await?;
        for path in files {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
