//! The Fact Store / Kernel (C3): the sole owner of EDB, the rule set, the
//! dedup index, and the derivation output.
//!
//! The prior art in this workspace kept this state lock-free
//! (`crossbeam::epoch` + `DashMap`), which is excellent when every field
//! can be swapped independently. This kernel cannot use that shape: the
//! invariants require the EDB, the atom-cache projection, and the dedup index to
//! mutate as a single atomic unit, and a derived IDB rebuild must see a
//! consistent snapshot of all three. A `parking_lot::RwLock<KernelState>`
//! gives that for free and is the more direct implementation of the
//! invariants as written; `parking_lot` itself is retained from the prior
//! art's dependency stack, just used for a guarded critical section
//! instead of a try-lock spin.

use crate::atom::Atom;
use crate::config::KernelConfig;
use crate::datalog::{Program, Rule};
use crate::error::{HotLoadStage, KernelError, Result};
use crate::fact::Fact;
use crate::hotload;
use crate::syntax::parse_rule_text;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

thread_local! {
    /// Kernel instances (identified by address) this thread currently
    /// holds a write section open for. Per-thread rather than per-process:
    /// two different threads asserting concurrently must both proceed and
    /// serialize on `state`'s `RwLock`, only a thread calling back into its
    /// own in-progress write (e.g. a virtual-predicate handler or an
    /// `ActionHandler` re-entering `assert`) is a genuine reentrancy.
    static WRITE_SECTIONS: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// A callback that produces the current extension of a *virtual*
/// (bound) predicate. Should not call back into the kernel's own write
/// operations from the same thread — the reentrancy guard turns that into
/// a clean `Reentrancy` error rather than a deadlock, but the result is
/// still a failed evaluation.
pub type VirtualHandler = dyn Fn(&[Atom]) -> Result<Vec<Fact>> + Send + Sync;

struct KernelState {
    edb: Vec<Fact>,
    atom_cache: Vec<Fact>,
    dedup_index: HashSet<String>,
    schemas: HashMap<String, usize>,
    learned_rules: Vec<Rule>,
    policy_dirty: bool,
    idb_snapshot: Option<Vec<Fact>>,
    max_facts: u64,
    derived_limit: u64,
    /// Bumped on every hot-load persist and on retraction of a
    /// `safe_action`/`admin_override`/`signed_approval` fact — the
    /// Control Gate's permission cache keys off this to satisfy the
    /// cache should invalidate whenever `learned_rules` changes.
    policy_generation: u64,
}

/// Report returned by [`Kernel::self_heal`].
#[derive(Debug, Clone)]
pub struct SelfHealReport {
    /// Rules that survived re-validation.
    pub surviving_count: usize,
    /// `(original_text, reason)` for each rule commented out this run.
    pub healed: Vec<(String, String)>,
}

/// The Fact Store / Kernel.
pub struct Kernel {
    state: RwLock<KernelState>,
    base_policy: Vec<Rule>,
    virtual_predicates: dashmap::DashMap<String, Arc<VirtualHandler>>,
    config: Arc<KernelConfig>,
    generation_counter: AtomicU64,
}

impl Kernel {
    /// Construct a kernel with the given base policy, schema table, and
    /// configuration.
    pub fn new(base_policy: Vec<Rule>, schemas: HashMap<String, usize>, config: Arc<KernelConfig>) -> Self {
        Kernel {
            state: RwLock::new(KernelState {
                edb: Vec::new(),
                atom_cache: Vec::new(),
                dedup_index: HashSet::new(),
                schemas,
                learned_rules: Vec::new(),
                policy_dirty: false,
                idb_snapshot: None,
                max_facts: config.max_facts_in_kernel,
                derived_limit: config.derived_fact_gas,
                policy_generation: 0,
            }),
            base_policy,
            virtual_predicates: dashmap::DashMap::new(),
            config,
            generation_counter: AtomicU64::new(0),
        }
    }

    /// Register a virtual predicate handler. Evaluation consults every
    /// registered handler once per run and folds its output into an
    /// evaluation-scoped, never-persisted fact set (resolving the open
    /// question on virtual-predicate dedup: they are treated as ephemeral
    /// and are re-derived, never stored in the EDB or the dedup index).
    pub fn register_virtual_predicate<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[Atom]) -> Result<Vec<Fact>> + Send + Sync + 'static,
    {
        self.virtual_predicates.insert(name.into(), Arc::new(handler));
    }

    /// Monotonic counter surfaced to the Control Gate so its permission
    /// cache can tell when `learned_rules` (or a watched fact) changed.
    pub fn policy_generation(&self) -> u64 {
        self.state.read().policy_generation
    }

    fn enter_write(&self) -> Result<()> {
        let key = self as *const Kernel as usize;
        let already_open = WRITE_SECTIONS.with(|sections| !sections.borrow_mut().insert(key));
        if already_open {
            return Err(KernelError::Reentrancy);
        }
        Ok(())
    }

    fn exit_write(&self) {
        let key = self as *const Kernel as usize;
        WRITE_SECTIONS.with(|sections| {
            sections.borrow_mut().remove(&key);
        });
    }

    /// Assert one fact.
    pub fn assert(&self, fact: Fact) -> Result<()> {
        self.enter_write()?;
        let result = self.assert_locked(fact);
        self.exit_write();
        result
    }

    fn assert_locked(&self, fact: Fact) -> Result<()> {
        let mut state = self.state.write();

        // Atom conversion: if a schema is declared for this predicate,
        // its arity must match. Failure here means no mutation occurs.
        if let Some(&expected_arity) = state.schemas.get(fact.predicate.as_ref()) {
            if expected_arity != fact.arity() {
                return Err(KernelError::AtomConversion(format!(
                    "{} expects arity {expected_arity}, got {}",
                    fact.predicate,
                    fact.arity()
                )));
            }
        }

        if state.edb.len() as u64 >= state.max_facts {
            return Err(KernelError::KernelFull);
        }

        let canonical = fact.canonicalize();
        if state.dedup_index.contains(&canonical) {
            return Ok(()); // silent dedup hit, not an error
        }

        state.edb.push(fact.clone());
        state.atom_cache.push(fact);
        state.dedup_index.insert(canonical);
        state.idb_snapshot = None; // EDB changed; stale IDB must be recomputed
        Ok(())
    }

    /// Assert many facts; a failure on one does not block the rest
    /// (partial success).
    pub fn assert_batch(&self, facts: Vec<Fact>) -> Vec<Result<()>> {
        facts.into_iter().map(|f| self.assert(f)).collect()
    }

    /// Remove every fact matching `predicate` and `prefix_args` from EDB,
    /// atom cache, and dedup index in one critical section. Returns
    /// the count removed. Retracting a non-existent fact is a no-op.
    pub fn retract_match(&self, predicate: &str, prefix_args: &[Atom]) -> Result<usize> {
        self.enter_write()?;
        let mut state = self.state.write();
        let before = state.edb.len();
        state.edb.retain(|f| !f.matches_prefix(predicate, prefix_args));
        state.atom_cache.retain(|f| !f.matches_prefix(predicate, prefix_args));
        let removed = before - state.edb.len();
        if removed > 0 {
            // Rebuild the dedup index from the surviving EDB — cheaper
            // than tracking per-fact removal keys and impossible to get
            // out of sync with the retain() above.
            state.dedup_index = state.edb.iter().map(Fact::canonicalize).collect();
            state.idb_snapshot = None;
            if matches!(predicate, "safe_action" | "admin_override" | "signed_approval") {
                state.policy_generation += 1;
            }
        }
        self.exit_write();
        Ok(removed)
    }

    /// Query all facts (IDB ∪ EDB) matching `predicate`, triggering a
    /// fresh evaluation if `policy_dirty`, the IDB snapshot is missing, or
    /// the EDB changed since the last evaluation.
    pub fn query(&self, predicate: &str) -> Result<Vec<Fact>> {
        let needs_eval = {
            let state = self.state.read();
            state.policy_dirty || state.idb_snapshot.is_none()
        };

        if needs_eval {
            self.reevaluate()?;
        }

        let state = self.state.read();
        let idb = state.idb_snapshot.as_deref().unwrap_or(&[]);
        Ok(crate::datalog::query_predicate(predicate, &state.edb, idb))
    }

    /// Boolean convenience over [`Kernel::query`] for a fully-ground
    /// pattern (predicate plus exact args).
    pub fn query_bool(&self, predicate: &str, args: &[Atom]) -> Result<bool> {
        let matches = self.query(predicate)?;
        Ok(matches.iter().any(|f| f.args.as_ref() == args))
    }

    fn reevaluate(&self) -> Result<()> {
        // Fast path: a read lock is enough to tell whether another thread
        // already rebuilt the snapshot, and lets us skip the (potentially
        // expensive) virtual-predicate calls below entirely.
        {
            let state = self.state.read();
            if state.idb_snapshot.is_some() && !state.policy_dirty {
                return Ok(());
            }
        }

        // Call every virtual-predicate handler with NO kernel lock held.
        // Holding the write lock across this call would turn a handler
        // that calls back into `assert`/`retract_match` on this thread
        // into an outright deadlock (parking_lot's RwLock is not
        // reentrant); calling with no lock held means such a callback
        // instead gets a clean, non-deadlocking `Reentrancy` error.
        let mut virtual_facts = Vec::new();
        for entry in self.virtual_predicates.iter() {
            let facts = (entry.value())(&[])?;
            virtual_facts.extend(facts);
        }

        // Re-acquire the write lock and re-check `policy_dirty` after
        // acquisition (check-drop-recheck) to avoid a reader-to-writer
        // upgrade deadlock.
        let mut state = self.state.write();
        if state.idb_snapshot.is_some() && !state.policy_dirty {
            return Ok(()); // another thread already rebuilt it
        }

        let program = Program { base_policy: self.base_policy.clone(), learned_rules: state.learned_rules.clone() };
        let mut scratch_edb = state.edb.clone();
        scratch_edb.extend(virtual_facts);

        match program.evaluate(&scratch_edb, state.derived_limit) {
            Ok((idb, _stats)) => {
                state.idb_snapshot = Some(idb);
                state.policy_dirty = false;
                Ok(())
            }
            Err(e) => {
                // Previous IDB snapshot (if any) is retained untouched;
                // the store is not corrupted.
                Err(e)
            }
        }
    }

    /// Run a rule candidate through the five-stage hot-load pipeline.
    pub fn hot_load(
        &self,
        rule_text: &str,
        interceptor: Option<&hotload::RepairInterceptor>,
    ) -> Result<()> {
        self.enter_write()?;
        let result = self.hot_load_locked(rule_text, interceptor);
        self.exit_write();
        result
    }

    fn hot_load_locked(
        &self,
        rule_text: &str,
        interceptor: Option<&hotload::RepairInterceptor>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let program = Program { base_policy: self.base_policy.clone(), learned_rules: state.learned_rules.clone() };
        let rule = hotload::validate_candidate(rule_text, &program, &state.schemas, interceptor)?;
        state.learned_rules.push(rule);
        state.policy_dirty = true;
        state.policy_generation += 1;
        Ok(())
    }

    /// Re-validate every persisted learned rule (stages 2–4 only) and
    /// comment out any that now fail, returning a report. `log_lines` is
    /// the current learned-rules log contents; the caller is responsible
    /// for persisting the returned replacement lines.
    pub fn self_heal(&self, log_lines: &[String]) -> (SelfHealReport, Vec<String>) {
        let state = self.state.read();
        let (surviving, healed) = hotload::self_heal(log_lines, &self.base_policy, &state.schemas);
        drop(state);

        let mut new_lines = Vec::with_capacity(log_lines.len());
        let healed_texts: HashSet<&str> = healed.iter().map(|(t, _)| t.as_str()).collect();
        for line in log_lines {
            let trimmed = line.trim();
            if healed_texts.contains(trimmed) {
                let reason = healed.iter().find(|(t, _)| t == trimmed).map(|(_, r)| r.clone()).unwrap_or_default();
                new_lines.push(format!("# SELF-HEALED: {reason}\n# {trimmed}"));
            } else {
                new_lines.push(line.clone());
            }
        }

        let mut state = self.state.write();
        state.learned_rules = surviving.clone();
        state.policy_dirty = true;
        (SelfHealReport { surviving_count: surviving.len(), healed }, new_lines)
    }

    /// Snapshot of every asserted fact.
    pub fn get_all_facts(&self) -> Vec<Fact> {
        self.state.read().edb.clone()
    }

    /// Update the fact cap at runtime.
    pub fn set_max_facts(&self, n: u64) {
        self.state.write().max_facts = n;
    }

    /// Number of learned rules currently installed.
    pub fn learned_rule_count(&self) -> usize {
        self.state.read().learned_rules.len()
    }

    /// Parse-only helper exposed for callers that want to validate rule
    /// text without installing it (e.g. the CLI's `validate` command).
    pub fn parse_rule_preview(rule_text: &str) -> Result<Rule> {
        parse_rule_text(rule_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel {
        Kernel::new(Vec::new(), HashMap::new(), Arc::new(KernelConfig::default()))
    }

    #[test]
    fn dedup_idempotence() {
        let k = kernel();
        let f = Fact::new("p", vec![Atom::name("a")]);
        k.assert(f.clone()).unwrap();
        let before = k.get_all_facts().len();
        k.assert(f).unwrap();
        assert_eq!(k.get_all_facts().len(), before);
    }

    #[test]
    fn retract_restores_pre_assert_state() {
        let k = kernel();
        let f = Fact::new("p", vec![Atom::name("a")]);
        let before = k.get_all_facts().len();
        k.assert(f.clone()).unwrap();
        k.retract_match("p", &[Atom::name("a")]).unwrap();
        assert_eq!(k.get_all_facts().len(), before);
    }

    #[test]
    fn cap_enforcement() {
        let k = kernel();
        k.set_max_facts(2);
        for i in 0..5 {
            let f = Fact::new("p", vec![Atom::Int(i)]);
            let r = k.assert(f);
            if i < 2 {
                assert!(r.is_ok());
            } else {
                assert!(matches!(r, Err(KernelError::KernelFull)));
            }
        }
        assert_eq!(k.get_all_facts().len(), 2);
    }

    #[test]
    fn query_evaluates_derived_facts() {
        let rule = parse_rule_text("derived(X) :- base(X).").unwrap();
        let k = Kernel::new(vec![rule], HashMap::new(), Arc::new(KernelConfig::default()));
        k.assert(Fact::new("base", vec![Atom::name("a")])).unwrap();
        let derived = k.query("derived").unwrap();
        assert_eq!(derived.len(), 1);
    }

    #[test]
    fn gas_explosion_preserves_prior_idb() {
        let rule = parse_rule_text("derived(X) :- base(X).").unwrap();
        let config = Arc::new(KernelConfig { derived_fact_gas: 1, ..KernelConfig::default() });
        let k = Kernel::new(vec![rule], HashMap::new(), config);
        k.assert(Fact::new("base", vec![Atom::name("a")])).unwrap();
        assert!(k.query("derived").unwrap().len() <= 1);
        k.assert(Fact::new("base", vec![Atom::name("b")])).unwrap();
        // Second assert pushes derivation past gas=1; query should surface
        // the failure rather than silently truncating.
        let result = k.query("derived");
        assert!(result.is_err() || result.unwrap().len() <= 1);
    }

    #[test]
    fn hot_load_rejects_loop_risk() {
        let k = kernel();
        let result = k.hot_load("next_action(/initialize) :- current_time(T).", None);
        assert!(matches!(result, Err(KernelError::RuleRejected { .. })));
        assert_eq!(k.learned_rule_count(), 0);
    }

    #[test]
    fn hot_load_accepts_and_marks_dirty() {
        let k = kernel();
        k.hot_load("permitted(A, T, P) :- safe_action(A), requested(A, T, P).", None).unwrap();
        assert_eq!(k.learned_rule_count(), 1);
    }

    #[test]
    fn reentrant_write_on_same_thread_errors_instead_of_deadlocking() {
        let k = kernel();
        k.enter_write().unwrap();
        assert!(matches!(k.enter_write(), Err(KernelError::Reentrancy)));
        k.exit_write();
        // Once closed, the section can be re-opened.
        assert!(k.enter_write().is_ok());
        k.exit_write();
    }

    #[test]
    fn concurrent_asserts_from_different_threads_both_succeed() {
        let k = Arc::new(kernel());
        let (k1, k2) = (k.clone(), k.clone());
        let t1 = std::thread::spawn(move || k1.assert(Fact::new("p", vec![Atom::Int(1)])));
        let t2 = std::thread::spawn(move || k2.assert(Fact::new("p", vec![Atom::Int(2)])));
        assert!(t1.join().unwrap().is_ok());
        assert!(t2.join().unwrap().is_ok());
        assert_eq!(k.get_all_facts().len(), 2);
    }

    #[test]
    fn virtual_predicate_handler_can_assert_without_deadlock() {
        // reevaluate() invokes virtual-predicate handlers with no kernel
        // lock held, so a handler that calls back into `assert` on this
        // same thread proceeds rather than deadlocking on the
        // non-reentrant lock. The handler below captures the kernel
        // itself (a reference cycle, harmless for a short-lived test) to
        // exercise exactly that callback.
        let k = Arc::new(kernel());
        let callback_kernel = k.clone();
        k.register_virtual_predicate("derived_flag", move |_| {
            callback_kernel.assert(Fact::new("seen_by_handler", vec![Atom::Bool(true)])).unwrap();
            Ok(vec![Fact::new("derived_flag", vec![Atom::Bool(true)])])
        });

        let result = k.query("derived_flag");
        assert!(result.is_ok());
        assert_eq!(k.query("seen_by_handler").unwrap().len(), 1);
    }
}
