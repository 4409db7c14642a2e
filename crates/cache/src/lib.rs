//! Round result cache for Roundgate.
//!
//! [`ResultCache`] memoizes successful rounds by [`CacheKey`] on top of a
//! pluggable [`CacheStore`]. The file store keeps one JSON document per key
//! so entries survive restarts; the in-memory store backs tests and
//! throwaway deployments.
//!
//! [`CacheKey`]: roundgate_core::CacheKey

pub mod file_store;
pub mod in_memory;
pub mod result_cache;
pub mod store;

pub use file_store::FileCacheStore;
pub use in_memory::InMemoryCacheStore;
pub use result_cache::ResultCache;
pub use store::{CacheEntry, CacheError, CacheStore};
