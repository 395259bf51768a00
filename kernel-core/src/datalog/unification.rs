//! Pure unification routines: matching rule atoms against facts, building
//! up a [`Substitution`]. No allocation beyond the substitution itself
//! grows unboundedly; this module performs no I/O and never blocks.

use super::types::{RuleAtom, Substitution, Term};
use crate::atom::Atom;
use crate::fact::Fact;

/// Attempt to unify a single term against a ground atom value, extending
/// `sub`. Returns `false` (leaving `sub` partially extended by the caller's
/// discretion) on mismatch — callers should clone `sub` before attempting
/// unification of a whole atom so a failed attempt doesn't leak bindings.
fn unify_term(term: &Term, value: &Atom, sub: &mut Substitution) -> bool {
    match term {
        Term::Constant(c) => c == value,
        Term::Variable(v) => match sub.get(v) {
            Some(bound) => bound == value,
            None => {
                sub.bind(v, value.clone());
                true
            }
        },
    }
}

/// Unify a (non-negated) rule atom against one candidate fact. Returns an
/// extended substitution on success.
pub fn unify_atom_with_fact(
    atom: &RuleAtom,
    fact: &Fact,
    base: &Substitution,
) -> Option<Substitution> {
    if atom.predicate.as_ref() != fact.predicate.as_ref() {
        return None;
    }
    if atom.terms.len() != fact.args.len() {
        return None;
    }
    let mut sub = base.clone();
    for (term, value) in atom.terms.iter().zip(fact.args.iter()) {
        if !unify_term(term, value, &mut sub) {
            return None;
        }
    }
    Some(sub)
}

/// Find every fact in `candidates` that unifies with `atom` given `base`,
/// returning the extended substitutions. Candidates should already be
/// filtered to the atom's predicate by the caller's fact index for
/// efficiency; this function re-checks the predicate regardless.
pub fn find_matching_substitutions<'a>(
    atom: &RuleAtom,
    candidates: impl Iterator<Item = &'a Fact>,
    base: &Substitution,
) -> Vec<Substitution> {
    candidates
        .filter_map(|fact| unify_atom_with_fact(atom, fact, base))
        .collect()
}

/// Ground a rule atom fully under `sub`, returning `None` if any variable
/// remains unbound.
pub fn ground_atom(atom: &RuleAtom, sub: &Substitution) -> Option<Fact> {
    sub.ground_atom(atom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::RuleAtom;

    #[test]
    fn unify_binds_fresh_variable() {
        let atom = RuleAtom::positive("p", vec![Term::Variable("X".into())]);
        let fact = Fact::new("p", vec![Atom::name("a")]);
        let sub = unify_atom_with_fact(&atom, &fact, &Substitution::new()).unwrap();
        assert_eq!(sub.get("X"), Some(&Atom::name("a")));
    }

    #[test]
    fn unify_rejects_conflicting_binding() {
        let atom = RuleAtom::positive(
            "p",
            vec![Term::Variable("X".into()), Term::Variable("X".into())],
        );
        let fact = Fact::new("p", vec![Atom::name("a"), Atom::name("b")]);
        assert!(unify_atom_with_fact(&atom, &fact, &Substitution::new()).is_none());
    }

    #[test]
    fn unify_rejects_arity_mismatch() {
        let atom = RuleAtom::positive("p", vec![Term::Variable("X".into())]);
        let fact = Fact::new("p", vec![Atom::name("a"), Atom::name("b")]);
        assert!(unify_atom_with_fact(&atom, &fact, &Substitution::new()).is_none());
    }
}
