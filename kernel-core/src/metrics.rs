//! Prometheus metric descriptions and recording helpers for the kernel core.
//!
//! Registration is idempotent (`describe_*` is safe to call more than
//! once) so `init_metrics` can run from both `kernel-cli` and
//! `kernel-server` without coordination.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Register every metric this crate emits, with its help text.
pub fn init_metrics() {
    describe_counter!("kernel_assert_total", "Total facts asserted into the EDB");
    describe_counter!("kernel_retract_total", "Total facts retracted from the EDB");
    describe_gauge!("kernel_fact_store_size", "Current EDB size");
    describe_histogram!("kernel_evaluation_latency_seconds", "Datalog evaluation wall-clock time");
    describe_counter!("kernel_gas_aborts_total", "Evaluations aborted by the derived-fact gas cap");
    describe_counter!("kernel_hot_load_total", "Hot-load attempts by pipeline stage and outcome");
    describe_counter!("kernel_self_heal_total", "Learned rules commented out by self-heal at boot");

    describe_counter!("gate_constitutional_denies_total", "Constitutional rule denials by rule id");
    describe_counter!("gate_dispatch_total", "Action dispatch attempts by kind and result");
    describe_counter!("gate_runaway_halts_total", "Turns in which dispatch was suspended by the runaway-halt guard");

    describe_counter!("articulation_parse_total", "Envelope parses by resolved stage");
    describe_counter!("articulation_decoy_candidates_total", "Extra embedded-JSON candidates discarded by last-match-wins selection");

    describe_histogram!("activation_score_histogram", "Distribution of composed activation scores");

    describe_gauge!("context_token_utilization", "Fraction of the token budget currently in use");
    describe_counter!("context_compressions_total", "Context compression passes run");
    describe_counter!("context_budget_overrun_total", "Context builds that exceeded the token budget");
}

pub fn record_assert() {
    counter!("kernel_assert_total", 1);
}

pub fn record_retract(count: usize) {
    counter!("kernel_retract_total", count as u64);
}

pub fn update_fact_store_size(size: u64) {
    gauge!("kernel_fact_store_size", size as f64);
}

pub fn record_gas_abort() {
    counter!("kernel_gas_aborts_total", 1);
}

pub fn record_hot_load(stage: &str, outcome: &str) {
    counter!("kernel_hot_load_total", 1, "stage" => stage.to_string(), "outcome" => outcome.to_string());
}

pub fn record_self_heal(healed_count: usize) {
    counter!("kernel_self_heal_total", healed_count as u64);
}

pub fn record_constitutional_deny(rule_id: &'static str) {
    counter!("gate_constitutional_denies_total", 1, "rule_id" => rule_id);
}

pub fn record_dispatch(kind: &str, result: &str) {
    counter!("gate_dispatch_total", 1, "kind" => kind.to_string(), "result" => result.to_string());
}

pub fn record_runaway_halt() {
    counter!("gate_runaway_halts_total", 1);
}

pub fn record_articulation_parse(stage: &str) {
    counter!("articulation_parse_total", 1, "stage" => stage.to_string());
}

pub fn record_decoy_candidates(count: usize) {
    if count > 0 {
        counter!("articulation_decoy_candidates_total", count as u64);
    }
}

pub fn record_activation_score(score: f64) {
    histogram!("activation_score_histogram", score);
}

pub fn update_token_utilization(utilization: f64) {
    gauge!("context_token_utilization", utilization);
}

pub fn record_compression() {
    counter!("context_compressions_total", 1);
}

pub fn record_budget_overrun() {
    counter!("context_budget_overrun_total", 1);
}

/// Timer for measuring one operation's latency against a named histogram.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    pub fn new(metric_name: &'static str) -> Self {
        LatencyTimer { start: Instant::now(), metric_name }
    }

    pub fn record(self) {
        histogram!(self.metric_name, self.start.elapsed().as_secs_f64());
    }
}
