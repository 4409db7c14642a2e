//! Error types for the Roundgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Only failures that
//! affect the correctness of a response live here; diagnostic failures
//! (audit report writes, ordinary cache I/O) are absorbed where they occur.

use thiserror::Error;

/// The error type for everything that can fail a round.
#[derive(Debug, Error)]
pub enum RoundError {
    /// The external operation explicitly reported failure.
    #[error("Upstream round failed: {0}")]
    UpstreamVoid(String),

    /// The external operation returned something the gateway cannot decorate.
    #[error("Unexpected response type from agent: {0}")]
    UnexpectedOutcome(String),

    /// The admission queue reached its structural limit.
    #[error("Admission queue saturated: {waiting} waiting (limit {limit})")]
    AdmissionSaturated { waiting: usize, limit: usize },

    /// A queued caller's grant channel closed with no grant sent. The gate
    /// only drops a waiter's sender after sending on it, so this is a bug
    /// in the gate rather than a runtime condition.
    #[error("Admission gate closed while waiting")]
    AdmissionClosed,

    /// The durable cache has no space left.
    #[error("Cache storage exhausted: {0}")]
    CacheStorageExhausted(String),
}

/// Coarse classification used by the transport layer to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Upstream,
    Unexpected,
    Saturated,
    Storage,
    Internal,
}

impl RoundError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamVoid(_) => ErrorCategory::Upstream,
            Self::UnexpectedOutcome(_) => ErrorCategory::Unexpected,
            Self::AdmissionSaturated { .. } => ErrorCategory::Saturated,
            Self::CacheStorageExhausted(_) => ErrorCategory::Storage,
            Self::AdmissionClosed => ErrorCategory::Internal,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Upstream failures carry the agent's own message; everything else is
    /// reduced to a generic description.
    pub fn client_detail(&self) -> String {
        match self {
            Self::UpstreamVoid(message) => message.clone(),
            Self::UnexpectedOutcome(_) => "Unexpected response type from agent".into(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_keeps_message() {
        let err = RoundError::UpstreamVoid("agent could not parse query".into());
        assert!(err.to_string().contains("agent could not parse query"));
        assert_eq!(err.client_detail(), "agent could not parse query");
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }

    #[test]
    fn unexpected_outcome_is_generic_for_clients() {
        let err = RoundError::UnexpectedOutcome("payload was a string".into());
        assert_eq!(err.client_detail(), "Unexpected response type from agent");
        assert_eq!(err.category(), ErrorCategory::Unexpected);
    }

    #[test]
    fn saturation_displays_limits() {
        let err = RoundError::AdmissionSaturated {
            waiting: 64,
            limit: 64,
        };
        assert!(err.to_string().contains("64"));
        assert_eq!(err.category(), ErrorCategory::Saturated);
    }

    #[test]
    fn closed_gate_is_internal() {
        let err = RoundError::AdmissionClosed;
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.client_detail(), err.to_string());
    }
}
