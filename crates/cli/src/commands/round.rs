//! `roundgate round` — Run one round without starting a server.

use anyhow::Result;
use roundgate_core::{OperationMode, RoundRequest};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    description: String,
    anchors: Vec<String>,
    mode: Option<OperationMode>,
    no_cache: bool,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let gateway = roundgate_gateway::build_gateway(&config)?;

    let mut request = RoundRequest::new(description).with_anchors(anchors);
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }
    if no_cache {
        request = request.bypassing_cache();
    }

    let result = gateway.start_round(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse an operation mode the way it appears on the wire.
pub fn parse_mode(s: &str) -> Result<OperationMode, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown mode {s:?} (expected infer, fast or diligent)"))
}
