//! Cache store trait — where memoized rounds are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roundgate_core::{CacheKey, RoundResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored round result.
///
/// Only successful rounds are ever written, so an entry's existence means
/// the round for its key completed at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    pub result: RoundResult,
}

impl CacheEntry {
    pub fn new(key: CacheKey, result: RoundResult) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            result,
        }
    }

    /// Whether the entry is older than `ttl`. No TTL means it never expires.
    pub fn is_expired(&self, ttl: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        ttl.is_some_and(|ttl| now.signed_duration_since(self.created_at) > ttl)
    }
}

/// Errors from a cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    /// The underlying storage has no space left.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::StorageFull)
    }
}

/// Backing storage for [`crate::ResultCache`].
///
/// Implementations must make single-key reads and writes atomic: a reader
/// sees either the previous entry or the new one, never a torn write.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Fetch the entry for `key`. `Ok(None)` when there is none.
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or overwrite an entry.
    async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Remove the entry for `key`. Returns whether one existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize, CacheError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}
