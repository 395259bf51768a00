//! API request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Assert one fact into the EDB.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertRequest {
    /// Fact text, e.g. `safe_action(/read_file).`
    pub fact: String,
}

/// Result of an assert call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertResponse {
    pub fact: String,
    pub evaluation_time_ms: f64,
}

/// Retract every fact matching a predicate and bound argument prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractRequest {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Result of a retract call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractResponse {
    pub removed: usize,
}

/// Query a predicate for every EDB union IDB fact that matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub predicate: String,
}

/// Result of a query call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub facts: Vec<String>,
    pub evaluation_time_ms: f64,
}

/// Submit a candidate rule to the hot-load pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotLoadRequest {
    pub rule: String,
}

/// Result of a hot-load attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotLoadResponse {
    pub installed: bool,
    pub learned_rule_count: usize,
}

/// Run an `ActionRequest` through the Control Gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub action_id: String,
    pub kind: String,
    pub target: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// Result of a dispatch call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub outcome: DispatchOutcomeDto,
}

/// Wire form of `kernel_core::gate::DispatchOutcome`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcomeDto {
    Dispatched { summary: String },
    Denied { rule_id: String, reason: String },
    PermissionDenied,
}

impl From<kernel_core::gate::DispatchOutcome> for DispatchOutcomeDto {
    fn from(outcome: kernel_core::gate::DispatchOutcome) -> Self {
        match outcome {
            kernel_core::gate::DispatchOutcome::Dispatched { summary } => {
                DispatchOutcomeDto::Dispatched { summary }
            }
            kernel_core::gate::DispatchOutcome::Denied { rule_id, reason } => {
                DispatchOutcomeDto::Denied {
                    rule_id: rule_id.to_string(),
                    reason,
                }
            }
            kernel_core::gate::DispatchOutcome::PermissionDenied => {
                DispatchOutcomeDto::PermissionDenied
            }
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub fact_count: usize,
    pub learned_rule_count: usize,
}

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}
