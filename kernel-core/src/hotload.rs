//! The rule hot-load validation pipeline.
//!
//! Each stage either passes the candidate to the next stage or rejects it
//! with the stage that caught the problem; any rejection prevents every
//! later stage from running.

use crate::datalog::{Program, Rule};
use crate::error::{HotLoadStage, KernelError, Result};
use crate::syntax::parse_rule_text;
use std::collections::HashSet;

/// Optional interceptor consulted as stage 1. Returns `Some(repaired)` to
/// substitute different rule text, `None` to pass the candidate through
/// unmodified, or an `Err` to reject outright.
pub type RepairInterceptor = dyn Fn(&str) -> Result<Option<String>> + Send + Sync;

/// "Ubiquitous" predicates that are present in nearly every turn — a rule
/// deriving `next_action(...)` from essentially no real precondition is
/// almost certainly a startup-loop bug, not an intentional policy.
const UBIQUITOUS_PREDICATES: &[&str] = &[
    "current_time",
    "entry_point",
    "current_phase",
    "build_system",
    "system_startup",
    "northstar_defined",
];

/// Run the five-stage validation pipeline over `candidate_text` given the
/// current `program` and `schemas`. On success, returns the parsed, safe
/// `Rule` ready to append to `learned_rules`.
pub fn validate_candidate(
    candidate_text: &str,
    program: &Program,
    schemas: &std::collections::HashMap<String, usize>,
    interceptor: Option<&RepairInterceptor>,
) -> Result<Rule> {
    // Stage 1: optional repair interceptor.
    let text = if let Some(f) = interceptor {
        match f(candidate_text)? {
            Some(repaired) => repaired,
            None => candidate_text.to_string(),
        }
    } else {
        candidate_text.to_string()
    };

    let candidate = parse_rule_text(&text).map_err(|e| KernelError::RuleRejected {
        stage: HotLoadStage::SandboxCompile,
        reason: format!("parse failure: {e}"),
    })?;

    if !candidate.is_safe() {
        return Err(KernelError::RuleRejected {
            stage: HotLoadStage::SandboxCompile,
            reason: "unsafe rule: head variable not bound by a positive body atom".to_string(),
        });
    }

    // Stage 2: sandbox compile — build a throwaway program with the
    // candidate appended and require successful stratification.
    let mut sandbox = program.clone();
    sandbox.learned_rules.push(candidate.clone());
    sandbox
        .compile()
        .map_err(|e| KernelError::RuleRejected {
            stage: HotLoadStage::SandboxCompile,
            reason: format!("{e}"),
        })?;

    // Stage 3: schema validation — every body predicate must be declared,
    // if a schema exists at all (an empty schema table means "unchecked").
    if !schemas.is_empty() {
        for atom in &candidate.body {
            if !schemas.contains_key(atom.predicate.as_ref()) {
                return Err(KernelError::RuleRejected {
                    stage: HotLoadStage::SchemaValidation,
                    reason: format!("undeclared predicate: {}", atom.predicate),
                });
            }
        }
    }

    // Stage 4: infinite-loop risk detection.
    if let Some(reason) = loop_risk_reason(&candidate) {
        return Err(KernelError::RuleRejected { stage: HotLoadStage::LoopRisk, reason });
    }

    Ok(candidate)
}

fn loop_risk_reason(rule: &Rule) -> Option<String> {
    let head_is_next_action = rule.head.predicate.as_ref() == "next_action";
    let head_targets_system_start_or_init = head_is_next_action
        && rule.head.terms.len() == 1
        && matches!(
            &rule.head.terms[0],
            crate::datalog::Term::Constant(crate::atom::Atom::Name(n))
                if n.as_ref() == "/system_start" || n.as_ref() == "/initialize"
        );

    if head_targets_system_start_or_init && rule.body.iter().all(|a| !a.negated) {
        return Some("next_action(/system_start|/initialize) with unconditional body".to_string());
    }

    if head_is_next_action {
        let positive_ubiquitous = rule
            .body
            .iter()
            .filter(|a| !a.negated && UBIQUITOUS_PREDICATES.contains(&a.predicate.as_ref()))
            .count();
        let total_positive = rule.body.iter().filter(|a| !a.negated).count();
        if total_positive <= 1 && positive_ubiquitous >= 1 {
            return Some("next_action derived from ubiquitous predicate set".to_string());
        }
    }

    if rule.body.len() <= 2
        && !rule.body.is_empty()
        && rule.body.iter().all(|a| is_idle_pattern(a.predicate.as_ref()))
    {
        return Some("body matches idle-state pattern".to_string());
    }

    let wildcard_heavy = rule
        .body
        .iter()
        .filter(|a| is_session_state_predicate(a.predicate.as_ref()) && a.variables().len() == a.arity())
        .count();
    if rule.body.len() >= 3 && wildcard_heavy >= 3 {
        return Some("body is wildcard-heavy over session/state predicates".to_string());
    }

    if !rule.body.is_empty() && rule.body.iter().all(|a| a.negated) {
        return Some("body is entirely negated".to_string());
    }

    None
}

fn is_idle_pattern(predicate: &str) -> bool {
    (predicate.ends_with("_state") || predicate.ends_with("_status"))
        && predicate != "idle"
}

fn is_session_state_predicate(predicate: &str) -> bool {
    predicate.contains("session") || predicate.contains("state")
}

/// Parse the learned-rules log and run stages 2–4 against each entry
/// (boot-time self-heal). Lines beginning with `#` are skipped. Returns
/// the surviving rules and, for each failing line, the original text and
/// rejection reason so the caller can comment it back into the log with
/// a `# SELF-HEALED:` marker.
pub fn self_heal(
    log_lines: &[String],
    base_policy: &[Rule],
    schemas: &std::collections::HashMap<String, usize>,
) -> (Vec<Rule>, Vec<(String, String)>) {
    let mut surviving = Vec::new();
    let mut healed = Vec::new();
    let mut running_program = Program { base_policy: base_policy.to_vec(), learned_rules: Vec::new() };
    let mut seen_predicates: HashSet<String> = HashSet::new();

    for line in log_lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match validate_candidate(trimmed, &running_program, schemas, None) {
            Ok(rule) => {
                seen_predicates.insert(rule.head.predicate.to_string());
                running_program.learned_rules.push(rule.clone());
                surviving.push(rule);
            }
            Err(e) => healed.push((trimmed.to_string(), e.to_string())),
        }
    }
    (surviving, healed)
}
