//! Custom Datalog engine for the logic kernel.
//!
//! Hand-rolled interpreter rather than a compile-time macro engine
//! (datafrog/ascent/crepe-style) because the kernel must accept
//! *hot-loaded* rule text at runtime, after the validation pipeline in
//! [`crate::hotload`] has approved it — a macro-based engine would require
//! a recompile for every new rule.

pub mod evaluate;
pub mod stratify;
pub mod types;
pub mod unification;

pub use evaluate::{evaluate, query_predicate, EvaluationStats};
pub use types::{Rule, RuleAtom, Substitution, Term};

use crate::error::Result;
use crate::fact::Fact;

/// Everything needed to run an evaluation: the immutable base policy plus
/// any approved learned rules, already stratum-assigned.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Base policy rules, fixed at boot.
    pub base_policy: Vec<Rule>,
    /// Hot-loaded rules that survived the validation pipeline.
    pub learned_rules: Vec<Rule>,
}

impl Program {
    /// All rules the program currently comprises, base policy first.
    pub fn all_rules(&self) -> Vec<Rule> {
        let mut all = self.base_policy.clone();
        all.extend(self.learned_rules.clone());
        all
    }

    /// Validate that stratification succeeds over the full rule set —
    /// used by the hot-load sandbox-compile stage.
    pub fn compile(&self) -> Result<()> {
        stratify::stratify(&self.all_rules()).map(|_| ())
    }

    /// Evaluate this program against `edb` with the given gas cap.
    pub fn evaluate(&self, edb: &[Fact], gas: u64) -> Result<(Vec<Fact>, EvaluationStats)> {
        evaluate::evaluate(&self.all_rules(), edb, gas)
    }
}
