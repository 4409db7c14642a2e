//! Round orchestration — the single "start round" entry point.
//!
//! ```text
//! request ─▶ cache lookup ─┬─ hit ───────────────────────────────────────┐
//!                          └─ miss ─▶ admission ─▶ execute (usage scope) │
//!                                     ─▶ decorate ─▶ cache write ────────┤
//!                                                      audit final ids ◀─┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use roundgate_audit::{AuditLedger, item_ids_from_payload};
use roundgate_cache::ResultCache;
use roundgate_core::{
    Outcome, RoundError, RoundInput, RoundOperation, RoundRequest, RoundResult,
    generate_session_id,
};
use roundgate_telemetry::{PricingTable, UsageScope};
use tracing::{Instrument, error, info, info_span, warn};

use crate::admission::{AdmissionGate, DEFAULT_PRIORITY};

/// Composes the admission gate, result cache, usage scope and audit ledger
/// around one external [`RoundOperation`].
pub struct RoundGateway {
    operation: Arc<dyn RoundOperation>,
    cache: ResultCache,
    gate: Arc<AdmissionGate>,
    ledger: Arc<AuditLedger>,
    pricing: PricingTable,
}

impl RoundGateway {
    pub fn new(
        operation: Arc<dyn RoundOperation>,
        cache: ResultCache,
        gate: Arc<AdmissionGate>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            operation,
            cache,
            gate,
            ledger,
            pricing: PricingTable::with_defaults(),
        }
    }

    /// Use `pricing` for the per-round cost estimate.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn operation_name(&self) -> &str {
        self.operation.name()
    }

    /// Run a round, or return the stored result of an identical one.
    pub async fn start_round(&self, request: &RoundRequest) -> Result<RoundResult, RoundError> {
        let key = request.cache_key();
        let span = info_span!(
            "round",
            key = %key.short(),
            mode = %request.mode(),
            session = tracing::field::Empty,
        );

        async {
            let result = self
                .cache
                .get_or_compute(&key, request.bypass_cache(), || self.execute(request))
                .await?;
            self.record_final(&result).await;
            Ok::<_, RoundError>(result)
        }
        .instrument(span)
        .await
    }

    /// The cache-miss path: admit, run under a usage scope, decorate.
    async fn execute(&self, request: &RoundRequest) -> Result<RoundResult, RoundError> {
        let _permit = self.gate.acquire(DEFAULT_PRIORITY).await?;

        let session_id = generate_session_id();
        tracing::Span::current().record("session", session_id.as_str());

        let input = RoundInput {
            description: request.paper_description.clone(),
            anchor_ids: request.anchor_corpus_ids.clone(),
            operation_mode: request.mode(),
            conversation_id: session_id.clone(),
        };

        let started = Instant::now();
        let (outcome, usage) = UsageScope::run(self.operation.execute(input)).await;
        let outcome = outcome?;
        let kind = outcome.kind();

        let payload = match outcome {
            Outcome::Void { message } => {
                warn!(operation = self.operation.name(), %message, "round returned no result");
                return Err(RoundError::UpstreamVoid(message));
            }
            Outcome::Complete(payload) | Outcome::Partial(payload) => payload,
        };
        let payload = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                let found = json_type(&other);
                error!(operation = self.operation.name(), outcome = %kind, found, "round payload is not an object");
                return Err(RoundError::UnexpectedOutcome(format!(
                    "expected a JSON object, got {found}"
                )));
            }
        };

        info!(
            outcome = %kind,
            models = usage.len(),
            est_cost_usd = self.pricing.estimate_usd(&usage),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "round completed"
        );
        Ok(RoundResult::decorate(payload, usage, session_id))
    }

    /// The report write is blocking file I/O, so it runs off the worker.
    async fn record_final(&self, result: &RoundResult) {
        if !self.ledger.is_enabled() {
            return;
        }
        let ledger = self.ledger.clone();
        let ids = item_ids_from_payload(result.payload());
        if let Err(e) = tokio::task::spawn_blocking(move || ledger.record_final(ids)).await {
            warn!(error = %e, "audit report task failed");
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roundgate_audit::AuditSettings;
    use roundgate_cache::InMemoryCacheStore;
    use roundgate_core::OperationMode;
    use roundgate_telemetry::{UsageEvent, UsageMetadata, report_usage};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays a fixed outcome, reporting usage under the description as
    /// the model name so concurrent rounds are distinguishable.
    struct ScriptedOperation {
        outcome: Outcome,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        inputs: Mutex<Vec<RoundInput>>,
    }

    impl ScriptedOperation {
        fn new(outcome: Outcome) -> Arc<Self> {
            Self::slow(outcome, Duration::ZERO)
        }

        fn slow(outcome: Outcome, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoundOperation for ScriptedOperation {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, input: RoundInput) -> Result<Outcome, RoundError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            report_usage(&UsageEvent::new(
                input.description.clone(),
                UsageMetadata::tokens(10, 5),
            ));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            report_usage(&UsageEvent::new(
                input.description.clone(),
                UsageMetadata::tokens(1, 1),
            ));

            self.inputs.lock().unwrap().push(input);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    fn papers_payload(ids: &[&str]) -> serde_json::Value {
        let documents: Vec<_> = ids.iter().map(|id| json!({"corpus_id": id})).collect();
        json!({
            "response_text": "found some papers",
            "doc_collection": {"documents": documents},
        })
    }

    fn gateway_with(operation: Arc<ScriptedOperation>, capacity: usize) -> RoundGateway {
        RoundGateway::new(
            operation,
            ResultCache::new(Arc::new(InMemoryCacheStore::new())),
            AdmissionGate::new(capacity),
            Arc::new(AuditLedger::disabled()),
        )
    }

    #[tokio::test]
    async fn result_is_decorated_and_cached() {
        let op = ScriptedOperation::new(Outcome::Complete(papers_payload(&["1"])));
        let gateway = gateway_with(op.clone(), 3);
        let request = RoundRequest::new("transformers").with_mode(OperationMode::Diligent);

        let first = gateway.start_round(&request).await.unwrap();
        assert_eq!(first.payload()["response_text"], "found some papers");
        let usage = &first.token_breakdown_by_model()["transformers"];
        assert_eq!((usage.total, usage.prompt, usage.completion), (17, 11, 6));
        assert!(!first.session_id().is_empty());

        let second = gateway.start_round(&request).await.unwrap();
        assert_eq!(op.calls(), 1);
        assert_eq!(second, first);

        let inputs = op.inputs.lock().unwrap();
        assert_eq!(inputs[0].operation_mode, OperationMode::Diligent);
        assert_eq!(inputs[0].conversation_id, first.session_id());
    }

    #[tokio::test]
    async fn bypass_executes_again_with_new_session() {
        let op = ScriptedOperation::new(Outcome::Complete(json!({"x": 1})));
        let gateway = gateway_with(op.clone(), 3);
        let request = RoundRequest::new("q");

        let first = gateway.start_round(&request).await.unwrap();
        let fresh = gateway
            .start_round(&request.clone().bypassing_cache())
            .await
            .unwrap();
        assert_eq!(op.calls(), 2);
        assert_ne!(fresh.session_id(), first.session_id());

        // The bypassed execution replaced the stored entry.
        let cached = gateway.start_round(&request).await.unwrap();
        assert_eq!(cached.session_id(), fresh.session_id());
    }

    #[tokio::test]
    async fn void_is_an_upstream_error_and_not_cached() {
        let op = ScriptedOperation::new(Outcome::Void {
            message: "no papers matched".into(),
        });
        let gateway = gateway_with(op.clone(), 3);
        let request = RoundRequest::new("q");

        let err = gateway.start_round(&request).await.unwrap_err();
        assert!(matches!(err, RoundError::UpstreamVoid(ref m) if m == "no papers matched"));
        gateway.start_round(&request).await.unwrap_err();
        assert_eq!(op.calls(), 2);
        assert_eq!(gateway.gate().admitted(), 0);
    }

    #[tokio::test]
    async fn non_object_payload_is_unexpected() {
        let op = ScriptedOperation::new(Outcome::Complete(json!(["not", "an", "object"])));
        let gateway = gateway_with(op, 3);

        let err = gateway.start_round(&RoundRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, RoundError::UnexpectedOutcome(_)));
        assert_eq!(err.client_detail(), "Unexpected response type from agent");
    }

    #[tokio::test]
    async fn partial_results_are_cached_like_complete_ones() {
        let op = ScriptedOperation::new(Outcome::Partial(json!({"response_text": "some"})));
        let gateway = gateway_with(op.clone(), 3);
        let request = RoundRequest::new("q");

        gateway.start_round(&request).await.unwrap();
        gateway.start_round(&request).await.unwrap();
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test]
    async fn final_ids_are_audited_on_miss_and_hit() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(AuditLedger::new(AuditSettings::enabled_at(
            dir.path().join("audit.json"),
        )));
        let op = ScriptedOperation::new(Outcome::Complete(papers_payload(&["B", "C", "D"])));
        let gateway = RoundGateway::new(
            op,
            ResultCache::new(Arc::new(InMemoryCacheStore::new())),
            AdmissionGate::new(1),
            ledger.clone(),
        );

        ledger.record_retrieved(["A", "B", "C"]);
        gateway.start_round(&RoundRequest::new("q")).await.unwrap();
        std::fs::remove_file(dir.path().join("audit.json")).unwrap();

        // A cache hit reports again and rewrites the report.
        gateway.start_round(&RoundRequest::new("q")).await.unwrap();
        let report = ledger.report().unwrap();
        assert_eq!(report.sideloaded, vec!["D".to_string()]);
        assert_eq!(report.retrieved_only, vec!["A".to_string()]);
        assert!(dir.path().join("audit.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rounds_keep_usage_separate() {
        let op = ScriptedOperation::slow(
            Outcome::Complete(json!({"response_text": "ok"})),
            Duration::from_millis(10),
        );
        let gateway = Arc::new(gateway_with(op, 3));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    let description = format!("topic-{i}");
                    let result = gateway
                        .start_round(&RoundRequest::new(description.clone()))
                        .await
                        .unwrap();
                    (description, result)
                })
            })
            .collect();

        for h in handles {
            let (description, result) = h.await.unwrap();
            let usage = result.token_breakdown_by_model();
            assert_eq!(usage.len(), 1);
            assert_eq!(usage[&description].prompt, 11);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executions_never_exceed_capacity() {
        let op = ScriptedOperation::slow(
            Outcome::Complete(json!({"response_text": "ok"})),
            Duration::from_millis(15),
        );
        let gateway = Arc::new(gateway_with(op.clone(), 2));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .start_round(&RoundRequest::new(format!("distinct-{i}")))
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(op.calls(), 8);
        assert!(op.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gateway.gate().admitted(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn identical_concurrent_rounds_execute_once() {
        let op = ScriptedOperation::slow(
            Outcome::Complete(json!({"response_text": "ok"})),
            Duration::from_millis(20),
        );
        let gateway = Arc::new(gateway_with(op.clone(), 3));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.start_round(&RoundRequest::new("same")).await })
            })
            .collect();
        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap().unwrap().session_id().to_string());
        }

        assert_eq!(op.calls(), 1);
        assert!(sessions.windows(2).all(|w| w[0] == w[1]));
    }
}
