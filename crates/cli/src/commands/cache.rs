//! `roundgate cache` — Inspect and clear stored round results.

use anyhow::Result;
use roundgate_config::CacheBackend;
use std::path::Path;

pub async fn stats(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let store = roundgate_gateway::cache_store(&config.cache);

    println!("Result cache");
    println!("   Backend:  {}", store.name());
    if let Some(dir) = cache_dir(&config.cache) {
        println!("   Location: {}", dir.display());
    }
    println!("   Entries:  {}", store.len().await?);
    if let Some(ttl) = config.cache.ttl_secs {
        println!("   TTL:      {ttl}s");
    }
    Ok(())
}

pub async fn clear(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let store = roundgate_gateway::cache_store(&config.cache);

    let before = store.len().await?;
    store.clear().await?;
    println!("Removed {before} cached result(s)");
    Ok(())
}

fn cache_dir(config: &roundgate_config::CacheConfig) -> Option<std::path::PathBuf> {
    match config.backend {
        CacheBackend::File => Some(
            config
                .dir
                .clone()
                .unwrap_or_else(roundgate_cache::FileCacheStore::default_dir),
        ),
        CacheBackend::Memory => None,
    }
}
