//! `roundgate serve` — Start the HTTP API server.

use anyhow::Result;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<()> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Roundgate gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Upstream:  {}", config.upstream.url);
    println!("   Capacity:  {}", config.admission.capacity);
    println!("   Audit:     {}", if config.audit.enabled { "on" } else { "off" });

    roundgate_gateway::start(config).await?;

    Ok(())
}
