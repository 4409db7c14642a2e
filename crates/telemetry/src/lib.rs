//! Token usage collection and cost estimation for Roundgate.
//!
//! Every round runs inside a [`UsageScope`]. Code anywhere below the round,
//! across any number of `.await` points, reports model usage with
//! [`report_usage`]; the event lands in the collector of the round that is
//! executing on that task and nowhere else. The per-model totals are
//! attached to the round result, and the [`PricingTable`] turns them into
//! an estimated spend for the logs.

pub mod collector;
pub mod model;
pub mod pricing;

pub use collector::{UsageCollector, UsageScope, report_usage};
pub use model::{UsageEvent, UsageMetadata};
pub use pricing::{ModelPricing, PricingTable};
pub use roundgate_core::usage::{TokenUsage, UsageBreakdown};
