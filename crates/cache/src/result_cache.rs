//! Single-flight memoization of round results.
//!
//! `get_or_compute` is plain composition: it looks the key up, and on a
//! miss (or when bypassing) runs the compute future and stores what it
//! returns. Calls for the same key are serialized by a per-key async mutex,
//! so identical concurrent requests run the round once and the followers
//! read the stored entry.
//!
//! Store failures are cache problems, not round problems: a failed read is
//! a miss and a failed write is logged, except when the disk is full.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use roundgate_core::{CacheKey, RoundError, RoundResult};
use tracing::{debug, warn};

use crate::store::{CacheEntry, CacheStore};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Memoizes successful rounds by cache key.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Option<chrono::Duration>,
    inflight: Mutex<HashMap<CacheKey, KeyLock>>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: None,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Treat entries older than `ttl` as missing.
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the stored result for `key`, or run `compute` and store its
    /// result.
    ///
    /// With `bypass` the stored entry is not read, but the fresh result
    /// still replaces it. Errors from `compute` are returned unchanged and
    /// nothing is stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        bypass: bool,
        compute: F,
    ) -> Result<RoundResult, RoundError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RoundResult, RoundError>>,
    {
        let slot = self.acquire_slot(key);
        let _flight = slot.lock.lock().await;

        if !bypass {
            if let Some(result) = self.lookup(key).await {
                debug!(key = %key.short(), "cache hit");
                return Ok(result);
            }
            debug!(key = %key.short(), "cache miss");
        } else {
            debug!(key = %key.short(), "cache bypassed");
        }

        let result = compute().await?;
        self.persist(key, &result).await?;
        Ok(result)
    }

    /// Read a live entry. Any store failure counts as a miss.
    async fn lookup(&self, key: &CacheKey) -> Option<RoundResult> {
        match self.store.load(key).await {
            Ok(Some(entry)) if entry.is_expired(self.ttl, Utc::now()) => {
                debug!(key = %key.short(), created_at = %entry.created_at, "cache entry expired");
                None
            }
            Ok(Some(entry)) => Some(entry.result),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key.short(), error = %e, "unreadable cache entry, treating as miss");
                None
            }
        }
    }

    async fn persist(&self, key: &CacheKey, result: &RoundResult) -> Result<(), RoundError> {
        let entry = CacheEntry::new(key.clone(), result.clone());
        match self.store.store(&entry).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_storage_full() => {
                Err(RoundError::CacheStorageExhausted(e.to_string()))
            }
            Err(e) => {
                warn!(key = %key.short(), backend = self.store.name(), error = %e, "cache write failed");
                Ok(())
            }
        }
    }

    fn acquire_slot(&self, key: &CacheKey) -> InflightSlot<'_> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let lock = inflight.entry(key.clone()).or_default().clone();
        InflightSlot {
            cache: self,
            key: key.clone(),
            lock,
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds a key's lock handle and drops the map entry once nobody else
/// is waiting on it, on every exit path including cancellation.
struct InflightSlot<'a> {
    cache: &'a ResultCache,
    key: CacheKey,
    lock: KeyLock,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = self.cache.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&self.lock) <= 2 {
            inflight.remove(&self.key);
        }
    }
}
