//! `roundgate config` — Configuration management commands.

use anyhow::Result;
use roundgate_config::AppConfig;
use std::path::Path;

pub fn show(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", super::config_file(config_path).display());
}

pub fn print_default() {
    print!("{}", AppConfig::default_toml());
}

pub fn validate(config_path: Option<&Path>) -> Result<()> {
    println!("Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e:#}");
            return Err(e);
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to all interfaces");
    }
    if config.admission.max_waiting == Some(0) {
        warnings.push("admission.max_waiting = 0 rejects every round once capacity is reached");
    }
    if config.cache.ttl_secs == Some(0) {
        warnings.push("cache.ttl_secs = 0 makes every cached result stale immediately");
    }
    for w in &warnings {
        println!("   warning: {w}");
    }

    println!();
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Upstream:  {} ({}s timeout)", config.upstream.url, config.upstream.timeout_secs);
    println!("   Capacity:  {}", config.admission.capacity);
    println!("   Cache:     {:?}", config.cache.backend);
    println!("   Audit:     {}", config.audit.enabled);
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = super::super::config_file(None);
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }
}
