//! # Roundgate Core
//!
//! Domain types, traits, and error definitions for the Roundgate round
//! gateway. This crate has **no runtime dependencies** — it defines the
//! vocabulary that the cache, telemetry, audit and gateway crates share.
//!
//! ## Design Philosophy
//!
//! The expensive external operation is defined as a trait here
//! ([`RoundOperation`]). Implementations live elsewhere (the HTTP upstream
//! adapter in `roundgate-providers`, scripted fakes in tests). This enables:
//! - Swapping the upstream agent via configuration
//! - Testing gating, caching and accounting without a real agent
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod operation;
pub mod round;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use error::{ErrorCategory, RoundError};
pub use operation::{Outcome, OutcomeKind, RoundInput, RoundOperation};
pub use round::{CacheKey, OperationMode, RoundRequest, RoundResult, generate_session_id};
pub use usage::{TokenUsage, UsageBreakdown};
