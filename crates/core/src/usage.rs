//! Token usage counters attached to every round result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-model token counters.
///
/// `total` is whatever the model reported and is not required to equal
/// `prompt + completion`; reasoning tokens may be counted separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub prompt: u64,
    #[serde(default)]
    pub completion: u64,
    #[serde(default)]
    pub reasoning: u64,
}

impl TokenUsage {
    /// Add another set of counters into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.total = self.total.saturating_add(other.total);
        self.prompt = self.prompt.saturating_add(other.prompt);
        self.completion = self.completion.saturating_add(other.completion);
        self.reasoning = self.reasoning.saturating_add(other.reasoning);
    }
}

/// Usage keyed by model name. Ordered so serialized results are stable.
pub type UsageBreakdown = BTreeMap<String, TokenUsage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_adds_every_counter() {
        let mut usage = TokenUsage {
            total: 3,
            prompt: 2,
            completion: 1,
            reasoning: 0,
        };
        usage.accumulate(&TokenUsage {
            total: 7,
            prompt: 4,
            completion: 2,
            reasoning: 1,
        });
        assert_eq!(
            usage,
            TokenUsage {
                total: 10,
                prompt: 6,
                completion: 3,
                reasoning: 1,
            }
        );
    }

    #[test]
    fn missing_fields_deserialize_as_zero() {
        let usage: TokenUsage = serde_json::from_str(r#"{"total": 5}"#).unwrap();
        assert_eq!(usage.total, 5);
        assert_eq!(usage.reasoning, 0);
    }
}
