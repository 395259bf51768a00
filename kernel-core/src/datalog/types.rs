//! Program representation: terms, atoms, rules, substitutions (C2).

use crate::atom::Atom;
use crate::fact::Fact;
use std::collections::HashMap;
use std::sync::Arc;

/// A rule-body/head term: either a variable or a ground constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A logic variable, conventionally uppercase-or-underscore-led.
    Variable(String),
    /// A ground constant.
    Constant(Atom),
}

impl Term {
    /// Is this term already ground (a constant)?
    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }
}

/// An atom in a rule body or head: a predicate applied to terms, optionally
/// negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleAtom {
    /// Predicate symbol.
    pub predicate: Arc<str>,
    /// Arguments.
    pub terms: Vec<Term>,
    /// `true` if this atom appears negated in a rule body.
    pub negated: bool,
}

impl RuleAtom {
    /// Construct a positive rule atom.
    pub fn positive(predicate: impl Into<Arc<str>>, terms: Vec<Term>) -> Self {
        RuleAtom { predicate: predicate.into(), terms, negated: false }
    }

    /// Construct a negated rule atom.
    pub fn negative(predicate: impl Into<Arc<str>>, terms: Vec<Term>) -> Self {
        RuleAtom { predicate: predicate.into(), terms, negated: true }
    }

    /// Arity of this atom.
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Names of all variables appearing in this atom.
    pub fn variables(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|t| match t {
                Term::Variable(v) => Some(v.as_str()),
                Term::Constant(_) => None,
            })
            .collect()
    }

    /// Is every argument ground?
    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }
}

/// `head :- body.` A rule with no body (`body.is_empty()`) is a fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Rule head.
    pub head: RuleAtom,
    /// Rule body (conjunction of positive/negated atoms).
    pub body: Vec<RuleAtom>,
    /// Stratum this rule was assigned to by [`crate::datalog::stratify`].
    pub stratum: usize,
}

impl Rule {
    /// Construct a rule.
    pub fn new(head: RuleAtom, body: Vec<RuleAtom>) -> Self {
        Rule { head, body, stratum: 0 }
    }

    /// Construct a bare fact (a rule with an empty body).
    pub fn fact(head: RuleAtom) -> Self {
        Rule { head, body: Vec::new(), stratum: 0 }
    }

    /// Is this rule just a fact?
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Safety check: every variable in the head must
    /// appear in some positive body atom. An unsafe rule can derive
    /// facts with unbound variables, which is meaningless.
    pub fn is_safe(&self) -> bool {
        let bound: std::collections::HashSet<&str> = self
            .body
            .iter()
            .filter(|a| !a.negated)
            .flat_map(|a| a.variables())
            .collect();
        self.head.variables().iter().all(|v| bound.contains(v))
    }

    /// Predicates this rule's body depends on, tagged with whether the
    /// reference is negated — used by stratification.
    pub fn dependencies(&self) -> Vec<(&str, bool)> {
        self.body.iter().map(|a| (a.predicate.as_ref(), a.negated)).collect()
    }
}

/// A variable binding environment built up while unifying a rule body
/// against facts.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    bindings: HashMap<String, Atom>,
}

impl Substitution {
    /// An empty substitution.
    pub fn new() -> Self {
        Substitution::default()
    }

    /// Bind `var` to `value`, overwriting any previous binding.
    pub fn bind(&mut self, var: &str, value: Atom) {
        self.bindings.insert(var.to_string(), value);
    }

    /// Look up a variable's binding, if any.
    pub fn get(&self, var: &str) -> Option<&Atom> {
        self.bindings.get(var)
    }

    /// Apply this substitution to a term, leaving unbound variables as-is.
    pub fn apply_to_term(&self, term: &Term) -> Term {
        match term {
            Term::Constant(_) => term.clone(),
            Term::Variable(v) => match self.bindings.get(v) {
                Some(a) => Term::Constant(a.clone()),
                None => term.clone(),
            },
        }
    }

    /// Apply this substitution to every term of a rule atom, producing a
    /// fact if the result is fully ground.
    pub fn ground_atom(&self, atom: &RuleAtom) -> Option<Fact> {
        let args: Option<Vec<Atom>> = atom
            .terms
            .iter()
            .map(|t| match self.apply_to_term(t) {
                Term::Constant(a) => Some(a),
                Term::Variable(_) => None,
            })
            .collect();
        args.map(|args| Fact::new(atom.predicate.clone(), args))
    }

    /// Merge `other` into a clone of `self`; `other`'s bindings win on
    /// conflict only if consistent — returns `None` on a genuine conflict
    /// (same variable bound to two different constants).
    pub fn merge(&self, other: &Substitution) -> Option<Substitution> {
        let mut merged = self.clone();
        for (k, v) in &other.bindings {
            if let Some(existing) = merged.bindings.get(k) {
                if existing != v {
                    return None;
                }
            } else {
                merged.bindings.insert(k.clone(), v.clone());
            }
        }
        Some(merged)
    }
}
