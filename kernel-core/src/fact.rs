//! `Fact`: an immutable, arity-checked tuple over a predicate (C1).

use crate::atom::Atom;
use ahash::AHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// `{predicate, args}` — arguments are [`Atom`]s, arity matches the
/// predicate's declared schema. Facts are immutable once created; a
/// "change" is always a retract followed by an assert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Predicate symbol, snake_case by convention.
    pub predicate: Arc<str>,
    /// Fact arguments.
    pub args: Arc<[Atom]>,
}

impl Fact {
    /// Construct a fact from a predicate name and argument list.
    pub fn new(predicate: impl Into<Arc<str>>, args: Vec<Atom>) -> Self {
        Fact {
            predicate: predicate.into(),
            args: Arc::from(args),
        }
    }

    /// Arity of this fact.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Deterministic textual rendering used as the dedup key.
    ///
    /// `canonicalize` is injective on the set of valid facts: two facts
    /// with the same canonical form are observationally equivalent for
    /// evaluation, because the type-tagged argument tokens prevent
    /// `Int(42)`, `Float(42)`, and `Str("42")` from colliding.
    pub fn canonicalize(&self) -> String {
        let mut out = String::with_capacity(self.predicate.len() + self.args.len() * 8 + 2);
        out.push_str(&self.predicate);
        out.push('(');
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&a.canonical_token());
        }
        out.push(')');
        out
    }

    /// Program-text form the articulation atom parser can round-trip.
    pub fn render_source(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Atom::render_source).collect();
        format!("{}({}).", self.predicate, args.join(", "))
    }

    /// Fast, non-cryptographic hash of the canonical form, used for cache
    /// keys (permission cache, evaluation memoization) — never for dedup
    /// identity, which always uses the canonical string itself.
    pub fn hash_key(&self) -> u64 {
        let mut h = AHasher::default();
        self.canonicalize().hash(&mut h);
        h.finish()
    }

    /// Does this fact match `predicate` and the given argument prefix?
    /// An empty prefix matches any fact with that predicate.
    pub fn matches_prefix(&self, predicate: &str, prefix: &[Atom]) -> bool {
        if self.predicate.as_ref() != predicate {
            return false;
        }
        if prefix.len() > self.args.len() {
            return false;
        }
        self.args.iter().zip(prefix.iter()).all(|(a, b)| a == b)
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.canonicalize() == other.canonicalize()
    }
}
impl Eq for Fact {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_distinguishes_types() {
        let f1 = Fact::new("p", vec![Atom::Int(42)]);
        let f2 = Fact::new("p", vec![Atom::try_float(42.0).unwrap()]);
        let f3 = Fact::new("p", vec![Atom::string("42")]);
        assert_ne!(f1.canonicalize(), f2.canonicalize());
        assert_ne!(f1.canonicalize(), f3.canonicalize());
    }

    #[test]
    fn matches_prefix_respects_arity() {
        let f = Fact::new("dependency_link", vec![Atom::name("a"), Atom::name("b")]);
        assert!(f.matches_prefix("dependency_link", &[Atom::name("a")]));
        assert!(!f.matches_prefix("dependency_link", &[Atom::name("b")]));
        assert!(!f.matches_prefix("dependency_link", &[Atom::name("a"), Atom::name("b"), Atom::name("c")]));
    }

    #[test]
    fn render_source_round_trip_shape() {
        let f = Fact::new("safe_action", vec![Atom::name("read_file")]);
        assert_eq!(f.render_source(), "safe_action(/read_file).");
    }
}
