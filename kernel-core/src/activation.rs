//! The Activation Engine (C6): scores facts by spreading activation so
//! the compressor can greedily admit the most relevant ones into budget.

use crate::config::ActivationCaps;
use crate::fact::Fact;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Per-fact context the scoring components read from. Built fresh each
/// turn by the compressor from kernel facts and caller-supplied extras.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// Age of each fact, keyed by its canonical form.
    pub fact_age: HashMap<String, Duration>,
    /// Canonical forms of facts asserted in the current session.
    pub session_facts: HashSet<String>,
    /// Current intent target / focused paths / focused symbols (relevance).
    pub intent_target: Option<String>,
    pub focused_paths: Vec<String>,
    pub focused_symbols: Vec<String>,
    /// Verb -> predicate-name boost table (relevance).
    pub verb_predicate_boost: HashMap<String, f64>,
    /// predicate -> base priority, overriding the fallback table.
    pub predicate_priority: HashMap<String, f64>,
    /// canonical fact -> forward/reverse dependency canonical forms.
    pub forward_deps: HashMap<String, Vec<String>>,
    pub reverse_deps: HashMap<String, Vec<String>>,
    /// Symbol-graph neighbor bonus, keyed by canonical fact.
    pub symbol_graph_neighbors: HashMap<String, usize>,
    /// Campaign/phase/task names and relevant file/symbol lists.
    pub campaign_names: Vec<String>,
    pub campaign_relevant: Vec<String>,
    /// Issue keywords, weighted in `[0, 1]` (clamped before use).
    pub issue_keyword_weights: HashMap<String, f64>,
    /// Tiered files: tier 1 (50) .. tier 4 (10).
    pub tiered_files: HashMap<String, u8>,
    pub issue_error_types: Vec<String>,
    pub issue_expected_tests: Vec<String>,
}

fn fallback_base_priority(predicate: &str) -> f64 {
    match predicate {
        "safe_action" | "permitted" | "security_violation" => 100.0,
        "user_intent" | "next_action" => 90.0,
        "execution_result" => 70.0,
        "dependency_link" | "symbol_graph" => 50.0,
        _ => 30.0,
    }
}

/// Base-priority component: predicate priority from caller-supplied
/// overrides (a corpus, when available) or the fallback table.
pub fn base_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let raw = ctx
        .predicate_priority
        .get(fact.predicate.as_ref())
        .copied()
        .unwrap_or_else(|| fallback_base_priority(fact.predicate.as_ref()));
    raw.min(cap)
}

/// Recency component: decay buckets by fact age.
pub fn recency_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let raw = match ctx.fact_age.get(&fact.canonicalize()) {
        Some(age) if *age < Duration::from_secs(60) => 50.0,
        Some(age) if *age < Duration::from_secs(5 * 60) => 30.0,
        Some(age) if *age < Duration::from_secs(30 * 60) => 10.0,
        _ => 0.0,
    };
    raw.min(cap)
}

/// Relevance component: substring match against intent target, focused
/// paths/symbols, plus a verb-to-predicate boost table.
pub fn relevance_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let mut raw = 0.0;
    let rendered = fact.render_source();

    if let Some(target) = &ctx.intent_target {
        if !target.is_empty() && rendered.contains(target.as_str()) {
            raw += 30.0;
        }
    }
    for path in &ctx.focused_paths {
        if rendered.contains(path.as_str()) {
            raw += 20.0;
        }
    }
    for symbol in &ctx.focused_symbols {
        if rendered.contains(symbol.as_str()) {
            raw += 15.0;
        }
    }
    if let Some(boost) = ctx.verb_predicate_boost.get(fact.predicate.as_ref()) {
        raw += boost.clamp(0.0, 1.0) * cap;
    }
    raw.min(cap)
}

/// Dependency component: 30% inheritance from forward deps plus 5 per
/// reverse dep, plus a symbol-graph neighbor bonus.
pub fn dependency_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let key = fact.canonicalize();
    let forward_inherit = ctx.forward_deps.get(&key).map(|v| v.len() as f64 * 0.3).unwrap_or(0.0);
    let reverse_boost = ctx.reverse_deps.get(&key).map(|v| v.len() as f64 * 5.0).unwrap_or(0.0);
    let neighbor_bonus = ctx.symbol_graph_neighbors.get(&key).copied().unwrap_or(0) as f64 * 2.0;
    (forward_inherit + reverse_boost + neighbor_bonus).min(cap)
}

/// Campaign component: matches against current campaign/phase/task names
/// and their relevant-file/symbol lists.
pub fn campaign_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let rendered = fact.render_source();
    let mut raw = 0.0;
    for name in &ctx.campaign_names {
        if rendered.contains(name.as_str()) {
            raw += 20.0;
        }
    }
    for relevant in &ctx.campaign_relevant {
        if rendered.contains(relevant.as_str()) {
            raw += 15.0;
        }
    }
    raw.min(cap)
}

/// Session component: a flat bonus if the fact was added this session.
pub fn session_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    if ctx.session_facts.contains(&fact.canonicalize()) {
        cap
    } else {
        0.0
    }
}

/// Issue component: keyword-weighted match, tiered-file boosts,
/// error-type hits, expected-test hits.
pub fn issue_component(fact: &Fact, ctx: &ScoringContext, cap: f64) -> f64 {
    let rendered = fact.render_source();
    let mut raw = 0.0;

    for (keyword, weight) in &ctx.issue_keyword_weights {
        if rendered.contains(keyword.as_str()) {
            // Keyword weights are attacker-influenced (derived from issue
            // text); clamp before multiplication so a weight outside
            // [0, 1] cannot push unrelated facts into the window.
            raw += weight.clamp(0.0, 1.0) * 20.0;
        }
    }
    for (file, tier) in &ctx.tiered_files {
        if rendered.contains(file.as_str()) {
            raw += match tier {
                1 => 50.0,
                2 => 30.0,
                3 => 20.0,
                _ => 10.0,
            };
        }
    }
    for error_type in &ctx.issue_error_types {
        if rendered.contains(error_type.as_str()) {
            raw += 10.0;
        }
    }
    for test in &ctx.issue_expected_tests {
        if rendered.contains(test.as_str()) {
            raw += 10.0;
        }
    }
    raw.min(cap)
}

/// Composed score for one fact, each component independently capped and
/// the sum capped again at `caps.total`.
pub fn score(fact: &Fact, ctx: &ScoringContext, caps: &ActivationCaps) -> f64 {
    let total = base_component(fact, ctx, caps.base)
        + recency_component(fact, ctx, caps.recency)
        + relevance_component(fact, ctx, caps.relevance)
        + dependency_component(fact, ctx, caps.dependency)
        + campaign_component(fact, ctx, caps.campaign)
        + session_component(fact, ctx, caps.session)
        + issue_component(fact, ctx, caps.issue);
    total.min(caps.total)
}

/// Score every candidate, keep those at or above `threshold`, then
/// greedily admit in descending score order until `budget_tokens` of the
/// estimated text size would be exceeded.
pub fn select(
    facts: &[Fact],
    ctx: &ScoringContext,
    caps: &ActivationCaps,
    threshold: f64,
    budget_tokens: u64,
    estimate_tokens: impl Fn(&str) -> u64,
) -> Vec<Fact> {
    let mut scored: Vec<(f64, &Fact)> = facts
        .iter()
        .map(|f| (score(f, ctx, caps), f))
        .filter(|(s, _)| *s >= threshold)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut used = 0u64;
    let mut admitted = Vec::new();
    for (_, fact) in scored {
        let cost = estimate_tokens(&fact.render_source());
        if used + cost > budget_tokens {
            continue;
        }
        used += cost;
        admitted.push(fact.clone());
    }
    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    #[test]
    fn score_never_exceeds_total_cap() {
        let fact = Fact::new("issue_keyword", vec![Atom::string("overflow buffer crash")]);
        let mut ctx = ScoringContext::default();
        ctx.issue_keyword_weights.insert("overflow".to_string(), 100.0);
        ctx.issue_keyword_weights.insert("buffer".to_string(), 50.0);
        ctx.issue_keyword_weights.insert("crash".to_string(), 1000.0);
        let caps = ActivationCaps::default();
        assert!(score(&fact, &ctx, &caps) <= caps.total);
    }

    #[test]
    fn adversarial_keyword_weight_is_clamped() {
        let fact = Fact::new("note", vec![Atom::string("overflow")]);
        let mut ctx = ScoringContext::default();
        ctx.issue_keyword_weights.insert("overflow".to_string(), 100.0);
        let caps = ActivationCaps::default();
        let issue = issue_component(&fact, &ctx, caps.issue);
        assert!(issue <= 20.0);
    }

    #[test]
    fn session_component_is_flat_bonus() {
        let fact = Fact::new("p", vec![Atom::name("a")]);
        let mut ctx = ScoringContext::default();
        ctx.session_facts.insert(fact.canonicalize());
        let caps = ActivationCaps::default();
        assert_eq!(session_component(&fact, &ctx, caps.session), caps.session);
    }

    #[test]
    fn select_respects_token_budget() {
        let facts: Vec<Fact> = (0..20).map(|i| Fact::new("item", vec![Atom::Int(i)])).collect();
        let ctx = ScoringContext::default();
        let caps = ActivationCaps::default();
        let admitted = select(&facts, &ctx, &caps, 0.0, 50, |s| s.len() as u64);
        let total: u64 = admitted.iter().map(|f| f.render_source().len() as u64).sum();
        assert!(total <= 50);
    }
}
