//! Task-scoped usage collection.
//!
//! The collector for the running round is bound with a tokio task-local,
//! so each concurrently executing round resolves its own collector, even
//! when rounds interleave on the same worker thread. The binding is undone
//! by the runtime when the scoped future completes, fails, panics or is
//! dropped.

use std::future::Future;
use std::sync::{Arc, Mutex};

use roundgate_core::usage::UsageBreakdown;
use tracing::trace;

use crate::model::UsageEvent;

tokio::task_local! {
    static CURRENT_COLLECTOR: Arc<UsageCollector>;
}

/// Aggregates token usage per model for one round.
///
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly), so child
/// tasks spawned with [`UsageScope::propagate`] can report into it in
/// parallel.
#[derive(Debug, Default)]
pub struct UsageCollector {
    by_model: Mutex<UsageBreakdown>,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event's counts to its model bucket.
    ///
    /// Returns `false` for events without a usage payload, which are
    /// ignored.
    pub fn record(&self, event: &UsageEvent) -> bool {
        let Some(usage) = event.usage.as_ref() else {
            return false;
        };
        let model = event.resolved_model();
        let mut by_model = self.by_model.lock().unwrap_or_else(|e| e.into_inner());
        by_model
            .entry(model.to_string())
            .or_default()
            .accumulate(&usage.as_token_usage());
        trace!(model, "usage recorded");
        true
    }

    /// Current totals.
    pub fn snapshot(&self) -> UsageBreakdown {
        self.by_model
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Entry points for binding a collector to a round.
pub struct UsageScope;

impl UsageScope {
    /// Run `body` with a fresh collector bound as the ambient one.
    ///
    /// Whatever was bound before (usually nothing) is visible again once
    /// `body` finishes.
    pub async fn run<F>(body: F) -> (F::Output, UsageBreakdown)
    where
        F: Future,
    {
        let collector = Arc::new(UsageCollector::new());
        let output = CURRENT_COLLECTOR.scope(collector.clone(), body).await;
        (output, collector.snapshot())
    }

    /// The collector bound to the current task, if any.
    pub fn current() -> Option<Arc<UsageCollector>> {
        CURRENT_COLLECTOR.try_with(Arc::clone).ok()
    }

    /// Carry the current binding into a future that will run on another
    /// task, e.g. one passed to `tokio::spawn`.
    pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let current = Self::current();
        async move {
            match current {
                Some(collector) => CURRENT_COLLECTOR.scope(collector, fut).await,
                None => fut.await,
            }
        }
    }
}

/// Report a model call to the round executing on this task.
///
/// Returns `true` if the event was counted. Outside any scope this is a
/// no-op.
pub fn report_usage(event: &UsageEvent) -> bool {
    CURRENT_COLLECTOR
        .try_with(|collector| collector.record(event))
        .unwrap_or(false)
}
