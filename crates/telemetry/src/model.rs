//! Data model for usage events reported by model calls during a round.

use roundgate_core::usage::TokenUsage;
use serde::{Deserialize, Serialize};

/// Bucket for events that name no model at all.
pub const UNKNOWN_MODEL: &str = "unknown";

// ── Usage event ───────────────────────────────────────────────────────────

/// One model call finishing, as seen by the usage collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Model name as reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Model version, used when no name is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Token counts. `None` for calls that produced no text generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl UsageEvent {
    /// Create an event for a named model.
    pub fn new(model_name: impl Into<String>, usage: UsageMetadata) -> Self {
        Self {
            model_name: Some(model_name.into()),
            model_version: None,
            usage: Some(usage),
        }
    }

    /// The model bucket this event is attributed to.
    ///
    /// Prefers the model name, then the model version, then
    /// [`UNKNOWN_MODEL`]. Blank strings count as absent.
    pub fn resolved_model(&self) -> &str {
        self.model_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.model_version
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
            })
            .unwrap_or(UNKNOWN_MODEL)
    }
}

/// Raw token counts of a single call. Absent counts are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UsageMetadata {
    /// Shorthand for a call with input and output counts only.
    pub fn tokens(input: u64, output: u64) -> Self {
        Self {
            total_tokens: Some(input.saturating_add(output)),
            input_tokens: Some(input),
            output_tokens: Some(output),
            reasoning_tokens: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_tokens = Some(total);
        self
    }

    pub fn with_reasoning(mut self, reasoning: u64) -> Self {
        self.reasoning_tokens = Some(reasoning);
        self
    }

    pub fn as_token_usage(&self) -> TokenUsage {
        TokenUsage {
            total: self.total_tokens.unwrap_or(0),
            prompt: self.input_tokens.unwrap_or(0),
            completion: self.output_tokens.unwrap_or(0),
            reasoning: self.reasoning_tokens.unwrap_or(0),
        }
    }
}
