//! RoundOperation trait — the abstraction over the external agent.
//!
//! A round is expensive (seconds to minutes). The gateway never looks inside
//! it: it hands over a [`RoundInput`] and gets back an [`Outcome`].
//!
//! Implementations: HTTP upstream agent, scripted fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RoundError;
use crate::round::OperationMode;

/// Everything the external operation needs for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInput {
    pub description: String,
    #[serde(default)]
    pub anchor_ids: Vec<String>,
    #[serde(default)]
    pub operation_mode: OperationMode,
    /// Session id generated for this execution.
    pub conversation_id: String,
}

/// What the external operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation failed and says why.
    Void { message: String },
    /// A full result.
    Complete(serde_json::Value),
    /// A usable but incomplete result.
    Partial(serde_json::Value),
}

/// Discriminant of an [`Outcome`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Void,
    Complete,
    Partial,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Void { .. } => OutcomeKind::Void,
            Self::Complete(_) => OutcomeKind::Complete,
            Self::Partial(_) => OutcomeKind::Partial,
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// The external expensive operation.
///
/// Implementations may report token usage through the ambient usage scope
/// while they run; they do not need to return it.
#[async_trait]
pub trait RoundOperation: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Run one round.
    ///
    /// `Err` is reserved for failures that are not an agent verdict, such as
    /// a response the implementation could not interpret.
    async fn execute(&self, input: RoundInput) -> Result<Outcome, RoundError>;
}
