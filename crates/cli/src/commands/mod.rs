pub mod cache;
pub mod config_cmd;
pub mod round;
pub mod serve;

use anyhow::{Context, Result};
use roundgate_config::AppConfig;
use std::path::{Path, PathBuf};

/// Load configuration from `path`, or the default location, with
/// environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = config_file(path);
    AppConfig::load_with_env(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
