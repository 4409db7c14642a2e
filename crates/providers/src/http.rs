//! HTTP upstream — runs rounds on a remote agent service.
//!
//! The agent is reached with a single JSON POST carrying the [`RoundInput`].
//! It answers with a status envelope:
//!
//! ```json
//! {
//!   "status": "complete" | "partial" | "void",
//!   "data": { ... },
//!   "error": { "message": "..." },
//!   "usage_events": [ { "model_name": "...", "usage": { ... } } ],
//!   "retrieved_ids": [ "123", 456 ]
//! }
//! ```
//!
//! Usage events are reported to the caller's usage scope and retrieved item
//! ids to the audit ledger before the outcome is returned.

use async_trait::async_trait;
use roundgate_audit::{AuditLedger, item_id};
use roundgate_config::UpstreamConfig;
use roundgate_core::{Outcome, RoundError, RoundInput, RoundOperation};
use roundgate_telemetry::{UsageEvent, report_usage};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A round operation backed by a remote agent.
pub struct HttpRoundOperation {
    url: String,
    client: reqwest::Client,
    ledger: Arc<AuditLedger>,
}

impl HttpRoundOperation {
    /// Create an operation that posts to `url`, failing any request that
    /// takes longer than `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            ledger: Arc::new(AuditLedger::disabled()),
        })
    }

    /// Report the items each round retrieves to `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<AuditLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RoundOperation for HttpRoundOperation {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, input: RoundInput) -> Result<Outcome, RoundError> {
        debug!(url = %self.url, conversation_id = %input.conversation_id, "Dispatching round upstream");

        let response = match self.client.post(&self.url).json(&input).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Upstream request failed");
                return Err(RoundError::UpstreamVoid(format!("upstream request failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Upstream returned error");
            return Err(RoundError::UpstreamVoid(format!(
                "upstream returned {status}: {error_body}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RoundError::UpstreamVoid(format!("failed to read upstream body: {e}")))?;
        let envelope = parse_envelope(&body)?;

        let reported = envelope
            .usage_events
            .iter()
            .filter(|event| report_usage(event))
            .count();
        debug!(reported, "Upstream usage events recorded");

        if self.ledger.is_enabled() {
            self.ledger
                .record_retrieved(envelope.retrieved_ids.iter().filter_map(item_id));
        }

        envelope.into_outcome()
    }
}

// ── Wire format ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<EnvelopeError>,
    #[serde(default)]
    usage_events: Vec<UsageEvent>,
    /// Every item the agent pulled into a candidate pool this round.
    #[serde(default)]
    retrieved_ids: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    message: String,
}

fn parse_envelope(body: &[u8]) -> Result<Envelope, RoundError> {
    serde_json::from_slice(body)
        .map_err(|e| RoundError::UnexpectedOutcome(format!("unparsable upstream response: {e}")))
}

impl Envelope {
    fn into_outcome(self) -> Result<Outcome, RoundError> {
        match self.status.as_str() {
            "complete" => Ok(Outcome::Complete(self.data)),
            "partial" => Ok(Outcome::Partial(self.data)),
            "void" => Ok(Outcome::Void {
                message: self
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "agent returned no result".into()),
            }),
            other => Err(RoundError::UnexpectedOutcome(format!(
                "unknown upstream status {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use roundgate_audit::AuditSettings;
    use roundgate_core::OperationMode;
    use roundgate_telemetry::UsageScope;
    use serde_json::json;

    fn outcome_of(body: serde_json::Value) -> Result<Outcome, RoundError> {
        parse_envelope(body.to_string().as_bytes())?.into_outcome()
    }

    fn input() -> RoundInput {
        RoundInput {
            description: "graph neural networks for molecules".into(),
            anchor_ids: vec!["123".into()],
            operation_mode: OperationMode::Fast,
            conversation_id: "conv-1".into(),
        }
    }

    /// Serve `reply` for every POST on an ephemeral port.
    async fn serve(reply: serde_json::Value) -> String {
        let app = Router::new().route(
            "/run",
            post(move |Json(_input): Json<RoundInput>| {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/run")
    }

    #[test]
    fn complete_and_partial_carry_data() {
        let complete = outcome_of(json!({"status": "complete", "data": {"a": 1}})).unwrap();
        assert_eq!(complete, Outcome::Complete(json!({"a": 1})));

        let partial = outcome_of(json!({"status": "partial", "data": {"b": 2}})).unwrap();
        assert_eq!(partial, Outcome::Partial(json!({"b": 2})));
    }

    #[test]
    fn void_carries_message() {
        let void = outcome_of(json!({"status": "void", "error": {"message": "no papers"}})).unwrap();
        assert_eq!(
            void,
            Outcome::Void {
                message: "no papers".into()
            }
        );

        let bare = outcome_of(json!({"status": "void"})).unwrap();
        assert!(matches!(bare, Outcome::Void { message } if !message.is_empty()));
    }

    #[test]
    fn unknown_status_is_unexpected() {
        let err = outcome_of(json!({"status": "maybe", "data": {}})).unwrap_err();
        assert!(matches!(err, RoundError::UnexpectedOutcome(_)));
    }

    #[test]
    fn garbage_body_is_unexpected() {
        let err = parse_envelope(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, RoundError::UnexpectedOutcome(_)));
    }

    #[tokio::test]
    async fn usage_events_reach_the_scope() {
        let url = serve(json!({
            "status": "complete",
            "data": {"response_text": "ok"},
            "usage_events": [
                {"model_name": "gpt-4o", "usage": {"total_tokens": 15, "input_tokens": 10, "output_tokens": 5}},
                {"model_version": "claude-x", "usage": {"input_tokens": 3}},
                {"model_name": "gpt-4o"}
            ]
        }))
        .await;
        let op = HttpRoundOperation::new(url, Duration::from_secs(5)).unwrap();

        let (outcome, usage) = UsageScope::run(op.execute(input())).await;
        assert_eq!(outcome.unwrap(), Outcome::Complete(json!({"response_text": "ok"})));
        assert_eq!(usage["gpt-4o"].total, 15);
        assert_eq!(usage["gpt-4o"].prompt, 10);
        assert_eq!(usage["claude-x"].prompt, 3);
        assert_eq!(usage.len(), 2);
    }

    #[tokio::test]
    async fn retrieved_ids_reach_the_ledger() {
        let url = serve(json!({
            "status": "void",
            "error": {"message": "nothing relevant"},
            "retrieved_ids": ["123", 456, "", null]
        }))
        .await;
        let ledger = Arc::new(AuditLedger::new(AuditSettings::enabled_at("unused.json")));
        let op = HttpRoundOperation::new(url, Duration::from_secs(5))
            .unwrap()
            .with_ledger(ledger.clone());

        let outcome = op.execute(input()).await.unwrap();
        assert!(matches!(outcome, Outcome::Void { .. }));

        let report = ledger.report().unwrap();
        assert_eq!(report.retrieved_only, vec!["123", "456"]);
        assert_eq!(report.counts.retrieved, 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_void() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let op = HttpRoundOperation::new(format!("http://{addr}/run"), Duration::from_secs(2)).unwrap();
        let err = op.execute(input()).await.unwrap_err();
        assert!(matches!(err, RoundError::UpstreamVoid(_)));
    }

    #[tokio::test]
    async fn http_error_status_is_void() {
        let app = Router::new().route(
            "/run",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "agent down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let op = HttpRoundOperation::new(format!("http://{addr}/run"), Duration::from_secs(5)).unwrap();
        let err = op.execute(input()).await.unwrap_err();
        assert!(matches!(err, RoundError::UpstreamVoid(ref m) if m.contains("agent down")));
    }
}
