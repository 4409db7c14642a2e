//! Configuration loading, validation, and management for Roundgate.
//!
//! Loads configuration from `~/.roundgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Any non-empty value enables the audit ledger.
pub const AUDIT_ENV: &str = "ROUNDGATE_AUDIT";
/// Overrides the audit report destination.
pub const AUDIT_REPORT_ENV: &str = "ROUNDGATE_AUDIT_REPORT";
/// Overrides the upstream agent URL.
pub const UPSTREAM_URL_ENV: &str = "ROUNDGATE_UPSTREAM_URL";

/// Longest accepted `cache.ttl_secs`: one hundred years.
pub const MAX_CACHE_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// The root configuration structure.
///
/// Maps directly to `~/.roundgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Concurrency admission
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retrieved-versus-final audit ledger
    #[serde(default)]
    pub audit: AuditConfig,

    /// The external agent that performs rounds
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Token pricing used for cost estimates
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42700
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum rounds executing at once
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Maximum rounds queued for admission; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_waiting: Option<usize>,
}

fn default_capacity() -> usize {
    3
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_waiting: None,
        }
    }
}

/// Where memoized results are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// One JSON file per key; survives restarts.
    #[default]
    File,
    /// Process memory only.
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory for the file backend; `~/.roundgate/cache/rounds` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Entries older than this are recomputed; no expiry when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Report destination; `audit_report.json` in the working directory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Endpoint that executes a round
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8000/rounds/execute".into()
}
fn default_upstream_timeout() -> u64 {
    600
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.roundgate/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored, except that an empty [`AUDIT_ENV`] leaves
    /// the file setting alone rather than disabling the ledger.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if lookup(AUDIT_ENV).is_some() {
            self.audit.enabled = true;
        }
        if let Some(path) = lookup(AUDIT_REPORT_ENV) {
            self.audit.report_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup(UPSTREAM_URL_ENV) {
            self.upstream.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".roundgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "admission.capacity must be at least 1".into(),
            ));
        }

        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upstream.url must not be empty".into(),
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "upstream.timeout_secs must be > 0".into(),
            ));
        }

        if let Some(ttl) = self.cache.ttl_secs {
            if ttl > MAX_CACHE_TTL_SECS {
                return Err(ConfigError::ValidationError(format!(
                    "cache.ttl_secs must be at most {MAX_CACHE_TTL_SECS}, got {ttl}"
                )));
            }
        }

        for (model, pricing) in &self.telemetry.custom_pricing {
            if pricing.input_per_m < 0.0 || pricing.output_per_m < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "pricing for {model} must not be negative"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.admission.capacity, 3);
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert!(!config.audit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.upstream.url, config.upstream.url);
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = AppConfig {
            admission: AdmissionConfig {
                capacity: 0,
                max_waiting: None,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_ttl_rejected() {
        let config: AppConfig = toml::from_str("[cache]\nttl_secs = 100000000000000000").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("ttl_secs")
        ));

        let config: AppConfig =
            toml::from_str(&format!("[cache]\nttl_secs = {MAX_CACHE_TTL_SECS}")).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.admission.capacity, 3);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[admission]
capacity = 8
max_waiting = 100

[cache]
backend = "memory"
ttl_secs = 3600

[telemetry.custom_pricing."my-model"]
input_per_m = 1.0
output_per_m = 2.0
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.admission.capacity, 8);
        assert_eq!(config.admission.max_waiting, Some(100));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl_secs, Some(3600));
        assert_eq!(config.gateway.port, 42700);
        assert_eq!(config.telemetry.custom_pricing["my-model"].output_per_m, 2.0);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[admission\ncapacity = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            (AUDIT_ENV, "1"),
            (AUDIT_REPORT_ENV, "/var/log/audit.json"),
            (UPSTREAM_URL_ENV, "http://agent:9000/run"),
        ]));
        assert!(config.audit.enabled);
        assert_eq!(
            config.audit.report_path.as_deref(),
            Some(Path::new("/var/log/audit.json"))
        );
        assert_eq!(config.upstream.url, "http://agent:9000/run");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[(AUDIT_ENV, ""), (UPSTREAM_URL_ENV, "")]));
        assert!(!config.audit.enabled);
        assert_eq!(config.upstream.url, default_upstream_url());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[admission]"));
        assert!(toml_str.contains("capacity = 3"));
        assert!(toml_str.contains("42700"));
    }
}
