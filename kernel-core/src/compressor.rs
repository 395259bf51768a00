//! The Context Compressor (C7): token-budgeted "infinite context" layer.
//! Retains logical atoms, discards surface text, and emits a serialized
//! context block for the next LM call.

use crate::articulation::{ControlPacket, MemoryOp, MemoryOperation};
use crate::config::TokenBudgetConfig;
use crate::error::{KernelError, Result};
use crate::fact::Fact;
use crate::kernel::Kernel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Budget categories a context build draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetCategory {
    Core,
    Atoms,
    History,
    Working,
}

/// A plain `u64`-arithmetic token budget split into four reserves, so
/// `allocate`/`release`/`utilization` stay exact; only `utilization()`
/// itself returns a float, for comparison against the compression
/// threshold.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    total: u64,
    reserves: HashMap<BudgetCategory, u64>,
    used: HashMap<BudgetCategory, u64>,
    compress_threshold: f64,
}

impl TokenBudget {
    pub fn new(config: &TokenBudgetConfig) -> Self {
        let mut reserves = HashMap::new();
        reserves.insert(BudgetCategory::Core, (config.total as f64 * config.core_fraction) as u64);
        reserves.insert(BudgetCategory::Atoms, (config.total as f64 * config.atoms_fraction) as u64);
        reserves.insert(BudgetCategory::History, (config.total as f64 * config.history_fraction) as u64);
        reserves.insert(BudgetCategory::Working, (config.total as f64 * config.working_fraction) as u64);
        TokenBudget {
            total: config.total,
            reserves,
            used: HashMap::new(),
            compress_threshold: config.compress_threshold,
        }
    }

    /// Allocate `n` tokens to `category`. Fails with `BudgetOverrun` if
    /// this would exceed the total budget — callers must surface this
    /// rather than silently truncate.
    pub fn allocate(&mut self, category: BudgetCategory, n: u64) -> Result<()> {
        let prospective_total = self.total_used() + n;
        if prospective_total > self.total {
            return Err(KernelError::BudgetOverrun { used: prospective_total, budget: self.total });
        }
        *self.used.entry(category).or_insert(0) += n;
        Ok(())
    }

    /// Release `n` tokens previously allocated to `category`.
    pub fn release(&mut self, category: BudgetCategory, n: u64) {
        let entry = self.used.entry(category).or_insert(0);
        *entry = entry.saturating_sub(n);
    }

    /// Clear every category's usage, for a fresh per-turn recomputation
    /// rather than an ever-growing accumulation across turns.
    pub fn reset(&mut self) {
        self.used.clear();
    }

    pub fn total_used(&self) -> u64 {
        self.used.values().sum()
    }

    pub fn reserve_for(&self, category: BudgetCategory) -> u64 {
        self.reserves.get(&category).copied().unwrap_or(0)
    }

    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total_used() as f64 / self.total as f64
    }

    pub fn should_compress(&self) -> bool {
        self.utilization() >= self.compress_threshold
    }
}

/// ~4 characters/token heuristic, calibrated for the expected LM family.
pub fn estimate_tokens(s: &str) -> u64 {
    (s.chars().count() as u64).div_ceil(4)
}

/// One completed turn retained in the sliding window. Surface text is
/// never stored — only atoms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedTurn {
    pub turn: u64,
    pub intent_atom: Option<String>,
    pub focus_atoms: Vec<String>,
    pub result_atoms: Vec<String>,
    pub mangle_updates: Vec<String>,
    pub memory_ops: Vec<String>,
}

/// One rolled-up slice of history, produced by compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySegment {
    pub start: u64,
    pub end: u64,
    pub summary: String,
    pub key_atoms: Vec<String>,
    pub original_tokens: u64,
    pub compressed_tokens: u64,
    pub ratio: f64,
}

/// Serializable snapshot returned by `GetState` / consumed by `LoadState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedState {
    pub session_id: String,
    pub turn: u64,
    pub rolling_summary: Vec<HistorySegment>,
    pub recent_turns: Vec<CompressedTurn>,
    pub hot_facts: Vec<Fact>,
    pub ratio: f64,
}

/// Boundary to a language model used only for the compressor's
/// summarization step. The core depends on this interface, never on a
/// concrete provider HTTP client.
pub trait LMClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Boundary to an external memory store used only by `promote_to_long_term`
/// and `store_vector` memory operations. The core depends on this
/// interface, never on a concrete vector-store or long-term-memory client.
pub trait MemoryStore: Send + Sync {
    fn promote_to_long_term(&self, key: &str, value: &str) -> Result<()>;
    fn store_vector(&self, key: &str, value: &str) -> Result<()>;
}

/// The serialized context block `BuildContext` emits for the next LM call:
/// core directives, activated atoms, rolling-summary entries, and the
/// current recent-turn window, plus the total estimated token cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    pub core: String,
    pub atoms: Vec<String>,
    pub history: Vec<String>,
    pub working: String,
    pub total_tokens: u64,
}

/// Per-turn atom extraction (step 1 of per-turn processing): the
/// `user_intent` fact built from the control packet's intent
/// classification (if present), every mangle update that survives
/// validation, plus caller-supplied extras (e.g. tool-result atoms).
pub fn extract_atoms(control: &ControlPacket, extras: Vec<Fact>) -> Vec<Fact> {
    let mut atoms = extras;
    if let Some(intent) = &control.intent_classification {
        atoms.push(crate::articulation::build_user_intent_fact(intent));
    }
    for update in &control.mangle_updates {
        if let Some((predicate, args)) = crate::articulation::validate_mangle_update(update) {
            atoms.push(Fact::new(predicate, args));
        }
    }
    atoms
}

/// Apply one turn's memory operations (step 5 of per-turn processing):
/// `forget` retracts the named fact from the kernel; `promote_to_long_term`
/// and `store_vector` write to the external store, a no-op per operation
/// if none is wired. `note` is informational only.
pub fn apply_memory_operations(ops: &[MemoryOperation], kernel: &Kernel, store: Option<&dyn MemoryStore>) -> Result<()> {
    for op in ops {
        match op.op {
            MemoryOp::Forget => {
                if let Ok((predicate, args)) = crate::syntax::parse_fact_text(&op.key) {
                    kernel.retract_match(&predicate, &args)?;
                }
            }
            MemoryOp::PromoteToLongTerm => {
                if let Some(store) = store {
                    store.promote_to_long_term(&op.key, &op.value)?;
                }
            }
            MemoryOp::StoreVector => {
                if let Some(store) = store {
                    store.store_vector(&op.key, &op.value)?;
                }
            }
            MemoryOp::Note => {}
        }
    }
    Ok(())
}

const RECENT_WINDOW: usize = 10;
const MAX_KEY_ATOMS: usize = 200;

/// Owns the turn counter, recent-turn window, rolling summary, and token
/// budget for one session.
pub struct Compressor {
    session_id: String,
    turn: u64,
    recent_turns: Vec<CompressedTurn>,
    rolling_summary: Vec<HistorySegment>,
    budget: TokenBudget,
    target_ratio: f64,
    recency_decay: Duration,
}

impl Compressor {
    pub fn new(session_id: String, config: &TokenBudgetConfig) -> Self {
        Compressor {
            session_id,
            turn: 0,
            recent_turns: Vec::new(),
            rolling_summary: Vec::new(),
            budget: TokenBudget::new(config),
            target_ratio: config.target_ratio,
            recency_decay: Duration::from_secs(config.recency_decay_minutes * 60),
        }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut TokenBudget {
        &mut self.budget
    }

    /// Append a completed turn to the recent window and re-check
    /// `should_compress()`. Returns the new `HistorySegment` if a
    /// compression pass ran this call.
    pub fn record_turn(&mut self, turn: CompressedTurn, lm: Option<&dyn LMClient>) -> Option<HistorySegment> {
        self.turn = turn.turn;
        self.recent_turns.push(turn);
        if self.budget.should_compress() {
            self.compress(lm)
        } else {
            None
        }
    }

    /// Compress every turn beyond the recent window into one
    /// `HistorySegment`, dropping the compressed turns from the window.
    pub fn compress(&mut self, lm: Option<&dyn LMClient>) -> Option<HistorySegment> {
        if self.recent_turns.len() <= RECENT_WINDOW {
            return None;
        }
        let cutoff = self.recent_turns.len() - RECENT_WINDOW;
        let to_compress: Vec<CompressedTurn> = self.recent_turns.drain(..cutoff).collect();

        let mut key_atoms = Vec::new();
        for t in &to_compress {
            if let Some(intent) = &t.intent_atom {
                key_atoms.push(intent.clone());
            }
            key_atoms.extend(t.focus_atoms.iter().cloned());
            key_atoms.extend(t.result_atoms.iter().take(3).cloned());
            if key_atoms.len() >= MAX_KEY_ATOMS {
                key_atoms.truncate(MAX_KEY_ATOMS);
                break;
            }
        }
        key_atoms.sort();
        key_atoms.dedup();

        let original_text: String = to_compress
            .iter()
            .map(|t| format!("{:?}", t))
            .collect::<Vec<_>>()
            .join("\n");
        let original_tokens = estimate_tokens(&original_text);

        let fallback_summary = || {
            to_compress
                .iter()
                .map(|t| {
                    let results: Vec<&String> = t.result_atoms.iter().take(3).collect();
                    format!(
                        "turn {}: intent={:?} results={:?}",
                        t.turn,
                        t.intent_atom.as_deref().unwrap_or("-"),
                        results
                    )
                })
                .collect::<Vec<_>>()
                .join("; ")
        };

        let mut summary = match lm {
            Some(client) => {
                let prompt = format!("Summarize these turns concisely:\n{original_text}");
                client.complete(&prompt).unwrap_or_else(|_| fallback_summary())
            }
            None => fallback_summary(),
        };

        let mut compressed_tokens = estimate_tokens(&summary);
        let ceiling = original_tokens / self.target_ratio.max(1.0) as u64;
        if ceiling > 0 && compressed_tokens > ceiling {
            summary = key_atoms.join("; ");
            compressed_tokens = estimate_tokens(&summary);
        }

        let ratio = if compressed_tokens == 0 { 0.0 } else { original_tokens as f64 / compressed_tokens as f64 };
        let segment = HistorySegment {
            start: to_compress.first().map(|t| t.turn).unwrap_or(0),
            end: to_compress.last().map(|t| t.turn).unwrap_or(0),
            summary,
            key_atoms,
            original_tokens,
            compressed_tokens,
            ratio,
        };
        self.rolling_summary.push(segment.clone());
        Some(segment)
    }

    pub fn recency_decay(&self) -> Duration {
        self.recency_decay
    }

    /// `BuildContext`: assemble the serialized context block for the next
    /// LM call from core directives, the caller's activated atoms, the
    /// rolling summary, and the current recent-turn window, enforcing the
    /// token budget end-to-end. Resets the budget first so usage reflects
    /// only this build, not an accumulation across turns; returns
    /// `BudgetOverrun` the moment any section would push the total past
    /// budget, without emitting a partial block.
    pub fn build_context(&mut self, core: &str, activated_atoms: &[Fact]) -> Result<ContextBlock> {
        self.budget.reset();

        let core_tokens = estimate_tokens(core);
        self.budget.allocate(BudgetCategory::Core, core_tokens)?;

        let atoms: Vec<String> = activated_atoms.iter().map(Fact::render_source).collect();
        let atoms_tokens: u64 = atoms.iter().map(|a| estimate_tokens(a)).sum();
        self.budget.allocate(BudgetCategory::Atoms, atoms_tokens)?;

        let history: Vec<String> = self
            .rolling_summary
            .iter()
            .map(|seg| format!("turns {}-{}: {} [{}]", seg.start, seg.end, seg.summary, seg.key_atoms.join(", ")))
            .collect();
        let history_tokens: u64 = history.iter().map(|h| estimate_tokens(h)).sum();
        self.budget.allocate(BudgetCategory::History, history_tokens)?;

        let working = self
            .recent_turns
            .iter()
            .map(|t| format!("{:?}", t))
            .collect::<Vec<_>>()
            .join("\n");
        let working_tokens = estimate_tokens(&working);
        self.budget.allocate(BudgetCategory::Working, working_tokens)?;

        Ok(ContextBlock {
            core: core.to_string(),
            atoms,
            history,
            working,
            total_tokens: self.budget.total_used(),
        })
    }

    /// Serializable snapshot for persistence.
    pub fn get_state(&self, hot_facts: Vec<Fact>) -> CompressedState {
        let ratio = self.rolling_summary.last().map(|s| s.ratio).unwrap_or(1.0);
        CompressedState {
            session_id: self.session_id.clone(),
            turn: self.turn,
            rolling_summary: self.rolling_summary.clone(),
            recent_turns: self.recent_turns.clone(),
            hot_facts,
            ratio,
        }
    }

    /// Restore recent turns and rolling summary from a persisted
    /// snapshot. Hot facts are the caller's responsibility to re-assert
    /// via `Kernel::assert_batch` (kernel dedup skips duplicates).
    pub fn load_state(&mut self, state: CompressedState) {
        self.session_id = state.session_id;
        self.turn = state.turn;
        self.rolling_summary = state.rolling_summary;
        self.recent_turns = state.recent_turns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: u64) -> CompressedTurn {
        CompressedTurn {
            turn: n,
            intent_atom: Some(format!("user_intent(/build, {n})")),
            focus_atoms: vec![],
            result_atoms: vec![format!("execution_result(/a{n}, /ok, _)")],
            mangle_updates: vec![],
            memory_ops: vec![],
        }
    }

    #[test]
    fn budget_overrun_is_an_error() {
        let mut budget = TokenBudget::new(&TokenBudgetConfig { total: 100, ..TokenBudgetConfig::default() });
        assert!(budget.allocate(BudgetCategory::Working, 50).is_ok());
        assert!(matches!(budget.allocate(BudgetCategory::Working, 60), Err(KernelError::BudgetOverrun { .. })));
    }

    #[test]
    fn should_compress_respects_threshold() {
        let mut budget = TokenBudget::new(&TokenBudgetConfig { total: 100, compress_threshold: 0.5, ..TokenBudgetConfig::default() });
        assert!(!budget.should_compress());
        budget.allocate(BudgetCategory::Working, 60).unwrap();
        assert!(budget.should_compress());
    }

    #[test]
    fn compression_ratio_meets_target() {
        let mut compressor = Compressor::new("s1".to_string(), &TokenBudgetConfig::default());
        for i in 0..15 {
            compressor.recent_turns.push(turn(i));
        }
        let segment = compressor.compress(None).unwrap();
        assert!(segment.compressed_tokens <= segment.original_tokens);
        assert!(segment.ratio >= 1.0);
    }

    #[test]
    fn no_compression_below_window_size() {
        let mut compressor = Compressor::new("s1".to_string(), &TokenBudgetConfig::default());
        compressor.recent_turns.push(turn(0));
        assert!(compressor.compress(None).is_none());
    }

    /// S5: a context build whose sections together exceed the total
    /// budget must fail with `BudgetOverrun` rather than emit a truncated
    /// block.
    #[test]
    fn build_context_overrun_is_an_error() {
        let mut compressor = Compressor::new(
            "s1".to_string(),
            &TokenBudgetConfig { total: 10, ..TokenBudgetConfig::default() },
        );
        let huge_core = "x".repeat(10_000);
        let result = compressor.build_context(&huge_core, &[]);
        assert!(matches!(result, Err(KernelError::BudgetOverrun { .. })), "expected BudgetOverrun, got {result:?}");
    }

    #[test]
    fn build_context_assembles_core_atoms_and_history() {
        let mut compressor = Compressor::new("s1".to_string(), &TokenBudgetConfig::default());
        compressor.rolling_summary.push(HistorySegment {
            start: 0,
            end: 5,
            summary: "did some setup".to_string(),
            key_atoms: vec!["safe_action(/read_file)".to_string()],
            original_tokens: 40,
            compressed_tokens: 10,
            ratio: 4.0,
        });
        let atoms = vec![Fact::new("safe_action", vec![crate::atom::Atom::name("read_file")])];
        let block = compressor.build_context("you are a helpful agent", &atoms).unwrap();
        assert_eq!(block.core, "you are a helpful agent");
        assert_eq!(block.atoms.len(), 1);
        assert_eq!(block.history.len(), 1);
        assert!(block.total_tokens > 0);
    }

    #[test]
    fn get_state_round_trips_through_load_state() {
        let mut compressor = Compressor::new("s1".to_string(), &TokenBudgetConfig::default());
        for i in 0..3 {
            compressor.recent_turns.push(turn(i));
        }
        compressor.turn = 2;
        let state = compressor.get_state(vec![]);
        let mut restored = Compressor::new("other".to_string(), &TokenBudgetConfig::default());
        restored.load_state(state);
        assert_eq!(restored.turn, 2);
        assert_eq!(restored.recent_turns.len(), 3);
    }
}
