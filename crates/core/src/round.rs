//! Round request and result value types.
//!
//! A [`RoundRequest`] is built at the transport boundary and consumed once
//! by the gateway. The [`CacheKey`] is derived from the fields that decide
//! *what* is computed; the cache-read flag only decides *whether* a stored
//! result may be reused, so it never takes part in the key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::usage::UsageBreakdown;

/// How the agent should approach a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Let the agent decide (default).
    #[default]
    Infer,
    /// Cheap, shallow search.
    Fast,
    /// Exhaustive search.
    Diligent,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infer => write!(f, "infer"),
            Self::Fast => write!(f, "fast"),
            Self::Diligent => write!(f, "diligent"),
        }
    }
}

/// A request to run one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRequest {
    /// Free-text description of what the round should find.
    pub paper_description: String,

    /// Items the round should anchor on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchor_corpus_ids: Vec<String>,

    /// Operation mode; absent or null means [`OperationMode::Infer`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,

    /// Whether a stored result may be returned instead of running the round.
    #[serde(default = "default_true")]
    pub read_results_from_cache: bool,
}

fn default_true() -> bool {
    true
}

impl RoundRequest {
    /// Create a request with default mode that may read from the cache.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            paper_description: description.into(),
            anchor_corpus_ids: Vec::new(),
            operation_mode: None,
            read_results_from_cache: true,
        }
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.operation_mode = Some(mode);
        self
    }

    pub fn with_anchors(mut self, anchors: Vec<String>) -> Self {
        self.anchor_corpus_ids = anchors;
        self
    }

    /// Ask for a fresh execution even when a stored result exists.
    pub fn bypassing_cache(mut self) -> Self {
        self.read_results_from_cache = false;
        self
    }

    /// The effective operation mode.
    pub fn mode(&self) -> OperationMode {
        self.operation_mode.unwrap_or_default()
    }

    pub fn bypass_cache(&self) -> bool {
        !self.read_results_from_cache
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_parts(&self.paper_description, &self.anchor_corpus_ids, self.mode())
    }
}

/// Identity of a cached round: SHA-256 over the key-relevant request fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key. Anchor ids are treated as a set: order and duplicates
    /// do not change the key.
    pub fn from_parts(description: &str, anchor_ids: &[String], mode: OperationMode) -> Self {
        let anchors: BTreeSet<&str> = anchor_ids.iter().map(String::as_str).collect();
        let canonical = serde_json::json!({
            "description": description,
            "anchor_ids": anchors,
            "operation_mode": mode,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The decorated outcome of one round.
///
/// On the wire the domain payload is flattened next to the usage breakdown
/// and the session id, so clients see a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    #[serde(flatten)]
    payload: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    token_breakdown_by_model: UsageBreakdown,
    session_id: String,
}

impl RoundResult {
    /// Attach usage and the session id to an agent payload.
    ///
    /// Payload keys that collide with the decoration are replaced.
    pub fn decorate(
        mut payload: serde_json::Map<String, serde_json::Value>,
        usage: UsageBreakdown,
        session_id: impl Into<String>,
    ) -> Self {
        payload.remove("token_breakdown_by_model");
        payload.remove("session_id");
        Self {
            payload,
            token_breakdown_by_model: usage,
            session_id: session_id.into(),
        }
    }

    pub fn payload(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.payload
    }

    pub fn token_breakdown_by_model(&self) -> &UsageBreakdown {
        &self.token_breakdown_by_model
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Generate a fresh conversation/session id for one execution.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}
