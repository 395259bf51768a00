//! HTTP request handlers

use crate::api::{
    AssertRequest, AssertResponse, DispatchRequest, DispatchResponse, HealthResponse,
    HealthStatus, HotLoadRequest, HotLoadResponse, QueryRequest, QueryResponse, RetractRequest,
    RetractResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use kernel_core::atom::Atom;
use kernel_core::fact::Fact;
use kernel_core::gate::{ActionKind, ActionRequest};
use kernel_core::syntax::parse_fact_text;
use std::time::Instant;
use tracing::{debug, info};

fn parse_action_kind(s: &str) -> ActionKind {
    match s {
        "read_file" => ActionKind::ReadFile,
        "write_file" => ActionKind::WriteFile,
        "edit_file" => ActionKind::EditFile,
        "delete_file" => ActionKind::DeleteFile,
        "exec" => ActionKind::Exec,
        "mkdir" => ActionKind::Mkdir,
        "search" => ActionKind::Search,
        "net" => ActionKind::Net,
        other => ActionKind::Other(other.to_string()),
    }
}

/// `POST /v1/assert` — assert one fact into the EDB.
#[tracing::instrument(name = "assert", skip(state), fields(latency_ms = tracing::field::Empty))]
pub async fn assert(
    State(state): State<AppState>,
    Json(req): Json<AssertRequest>,
) -> ApiResult<Json<AssertResponse>> {
    let start = Instant::now();
    debug!("assert: {}", req.fact);

    let (predicate, args) = parse_fact_text(&req.fact)
        .map_err(|e| ApiError::BadRequest(format!("invalid fact: {e}")))?;
    let fact = Fact::new(predicate, args);
    state.kernel.assert(fact.clone())?;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::Span::current().record("latency_ms", elapsed_ms);
    info!("asserted {} ({:.2}ms)", fact.render_source(), elapsed_ms);

    Ok(Json(AssertResponse {
        fact: fact.render_source(),
        evaluation_time_ms: elapsed_ms,
    }))
}

/// `POST /v1/retract` — retract every fact matching a predicate and bound prefix.
#[tracing::instrument(name = "retract", skip(state))]
pub async fn retract(
    State(state): State<AppState>,
    Json(req): Json<RetractRequest>,
) -> ApiResult<Json<RetractResponse>> {
    let args: Vec<Atom> = req
        .args
        .iter()
        .map(|a| Atom::name(a.trim_start_matches('/')))
        .collect();
    let removed = state.kernel.retract_match(&req.predicate, &args)?;
    info!("retracted {} fact(s) matching {}", removed, req.predicate);
    Ok(Json(RetractResponse { removed }))
}

/// `POST /v1/query` — query a predicate.
#[tracing::instrument(name = "query", skip(state), fields(latency_ms = tracing::field::Empty))]
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    let start = Instant::now();
    let results = state.kernel.query(&req.predicate)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::Span::current().record("latency_ms", elapsed_ms);

    Ok(Json(QueryResponse {
        facts: results.iter().map(Fact::render_source).collect(),
        evaluation_time_ms: elapsed_ms,
    }))
}

/// `POST /v1/hot_load` — submit a candidate rule to the hot-load pipeline.
#[tracing::instrument(name = "hot_load", skip(state))]
pub async fn hot_load(
    State(state): State<AppState>,
    Json(req): Json<HotLoadRequest>,
) -> ApiResult<Json<HotLoadResponse>> {
    state.kernel.hot_load(&req.rule, None)?;
    info!("hot-loaded rule: {}", req.rule);
    Ok(Json(HotLoadResponse {
        installed: true,
        learned_rule_count: state.kernel.learned_rule_count(),
    }))
}

/// `POST /v1/dispatch` — run an action request through the Control Gate.
#[tracing::instrument(name = "dispatch", skip(state), fields(action_id = %req.action_id, kind = %req.kind))]
pub async fn dispatch(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> ApiResult<Json<DispatchResponse>> {
    let action = ActionRequest {
        action_id: req.action_id,
        kind: parse_action_kind(&req.kind),
        target: req.target,
        payload: req.payload,
        context: req.context,
    };
    let outcome = state.gate.process(action)?;
    Ok(Json(DispatchResponse {
        outcome: outcome.into(),
    }))
}

/// Health check - liveness probe.
pub async fn health_live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        fact_count: state.kernel.get_all_facts().len(),
        learned_rule_count: state.kernel.learned_rule_count(),
    })
}

/// Health check - readiness probe.
pub async fn health_ready(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    match state.kernel.query("permitted") {
        Ok(_) => Ok(Json(HealthResponse {
            status: HealthStatus::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.uptime_seconds(),
            fact_count: state.kernel.get_all_facts().len(),
            learned_rule_count: state.kernel.learned_rule_count(),
        })),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            Err(ApiError::ServiceUnavailable("kernel not ready".to_string()))
        }
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics() -> String {
    crate::metrics::get_prometheus_metrics()
}
