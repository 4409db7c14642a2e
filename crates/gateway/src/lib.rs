//! HTTP gateway for Roundgate.
//!
//! Exposes the single "start round" operation and a health check, and
//! wires the round pipeline together from configuration.
//!
//! Built on Axum for high performance async HTTP.

pub mod admission;
pub mod round;

pub use admission::{AdmissionGate, AdmissionPermit, DEFAULT_PRIORITY};
pub use round::RoundGateway;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use roundgate_audit::{AuditLedger, AuditSettings};
use roundgate_cache::{CacheStore, FileCacheStore, InMemoryCacheStore, ResultCache};
use roundgate_config::{AppConfig, CacheBackend, CacheConfig};
use roundgate_core::{ErrorCategory, RoundError, RoundRequest, RoundResult};
use roundgate_providers::HttpRoundOperation;
use roundgate_telemetry::{ModelPricing, PricingTable};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

type SharedGateway = Arc<RoundGateway>;

/// Errors raised while assembling or running the server.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to build upstream client: {0}")]
    UpstreamClient(String),

    #[error("Cache TTL of {0}s is out of range")]
    InvalidTtl(u64),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the Axum router with all gateway routes.
pub fn build_router(gateway: SharedGateway) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/2/rounds", post(start_round_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Assemble the round pipeline described by `config`.
pub fn build_gateway(config: &AppConfig) -> Result<RoundGateway, GatewayError> {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let ledger = Arc::new(AuditLedger::new(AuditSettings::resolve(
        config.audit.enabled,
        config.audit.report_path.as_deref(),
        &project_root,
    )));

    let operation = HttpRoundOperation::from_config(&config.upstream)
        .map_err(|e| GatewayError::UpstreamClient(e.to_string()))?
        .with_ledger(ledger.clone());

    let mut cache = ResultCache::new(cache_store(&config.cache));
    if let Some(ttl) = config.cache.ttl_secs {
        cache = cache.with_ttl(cache_ttl(ttl)?);
    }

    let gate = AdmissionGate::with_queue_limit(
        config.admission.capacity,
        config.admission.max_waiting,
    );

    // Apply custom pricing overrides
    let pricing = PricingTable::with_defaults();
    for (model, pricing_cfg) in &config.telemetry.custom_pricing {
        pricing.set(
            model.clone(),
            ModelPricing::new(pricing_cfg.input_per_m, pricing_cfg.output_per_m),
        );
    }

    info!(
        upstream = %operation.url(),
        capacity = config.admission.capacity,
        cache = ?config.cache.backend,
        audit = ledger.is_enabled(),
        "Round pipeline assembled"
    );

    Ok(RoundGateway::new(Arc::new(operation), cache, gate, ledger).with_pricing(pricing))
}

fn cache_ttl(secs: u64) -> Result<chrono::Duration, GatewayError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(GatewayError::InvalidTtl(secs))
}

/// The cache store selected by `config`.
pub fn cache_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match config.backend {
        CacheBackend::File => Arc::new(FileCacheStore::new(
            config.dir.clone().unwrap_or_else(FileCacheStore::default_dir),
        )),
        CacheBackend::Memory => Arc::new(InMemoryCacheStore::new()),
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let gateway = Arc::new(build_gateway(&config)?);
    let app = build_router(gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    operation: String,
    capacity: usize,
    admitted: usize,
    waiting: usize,
}

async fn health_handler(State(gateway): State<SharedGateway>) -> Json<HealthResponse> {
    let gate = gateway.gate();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        operation: gateway.operation_name().to_string(),
        capacity: gate.capacity(),
        admitted: gate.admitted(),
        waiting: gate.waiting(),
    })
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

async fn start_round_handler(
    State(gateway): State<SharedGateway>,
    Json(request): Json<RoundRequest>,
) -> Result<Json<RoundResult>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        mode = %request.mode(),
        anchors = request.anchor_corpus_ids.len(),
        cached = request.read_results_from_cache,
        "round request"
    );
    gateway
        .start_round(&request)
        .await
        .map(Json)
        .map_err(error_response)
}

fn error_response(err: RoundError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err.category() {
        ErrorCategory::Saturated => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Upstream
        | ErrorCategory::Unexpected
        | ErrorCategory::Storage
        | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match err.category() {
        ErrorCategory::Upstream | ErrorCategory::Saturated => {
            warn!(status = status.as_u16(), error = %err, "round failed")
        }
        _ => error!(status = status.as_u16(), error = %err, "round failed"),
    }
    (
        status,
        Json(ErrorResponse {
            detail: err.client_detail(),
        }),
    )
}
