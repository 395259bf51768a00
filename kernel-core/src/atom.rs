//! The `Atom` type: a typed constant used as a fact or rule argument (C1).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A typed constant.
///
/// Mirrors the five forms named in the data model: a `/`-prefixed name
/// constant, a quoted string, an integer, a float, or a boolean. Arguments
/// of facts and rule terms are always one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Atom {
    /// A `/`-prefixed symbolic constant, e.g. `/read_file`.
    Name(Arc<str>),
    /// A quoted string constant.
    Str(Arc<str>),
    /// A signed integer constant.
    Int(i64),
    /// A floating point constant, compared and hashed by bit pattern.
    Float(OrderedFloat),
    /// A boolean constant.
    Bool(bool),
}

/// Wraps `f64` so `Atom` can derive `PartialEq`/`Eq`/`Hash`.
///
/// NaN has no stable canonical form, so atom conversion rejects it before
/// an `OrderedFloat` carrying NaN is ever constructed (see
/// [`Atom::try_float`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for OrderedFloat {}
impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::Name(a), Atom::Name(b)) => a == b,
            (Atom::Str(a), Atom::Str(b)) => a == b,
            (Atom::Int(a), Atom::Int(b)) => a == b,
            (Atom::Float(a), Atom::Float(b)) => a == b,
            (Atom::Bool(a), Atom::Bool(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Atom {}

impl std::hash::Hash for Atom {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Atom::Name(s) | Atom::Str(s) => s.hash(state),
            Atom::Int(i) => i.hash(state),
            Atom::Float(f) => f.hash(state),
            Atom::Bool(b) => b.hash(state),
        }
    }
}

impl Atom {
    /// Construct a name constant, prefixing with `/` if the caller omitted it.
    pub fn name(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        let owned = if s.starts_with('/') {
            s.to_string()
        } else {
            format!("/{s}")
        };
        Atom::Name(Arc::from(owned))
    }

    /// Construct a string constant.
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Atom::Str(s.into())
    }

    /// Construct a float atom, rejecting NaN since it has no canonical form.
    pub fn try_float(v: f64) -> Option<Self> {
        if v.is_nan() {
            None
        } else {
            Some(Atom::Float(OrderedFloat(v)))
        }
    }

    /// The predicate-independent type tag, used by the canonical form.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Atom::Name(_) => "Name",
            Atom::Str(_) => "Str",
            Atom::Int(_) => "Int",
            Atom::Float(_) => "Float",
            Atom::Bool(_) => "Bool",
        }
    }

    /// Render in the mangle-update source grammar (round-trippable by the
    /// atom text parser in [`crate::articulation`]).
    pub fn render_source(&self) -> String {
        match self {
            Atom::Name(s) => s.to_string(),
            Atom::Str(s) => format!("\"{}\"", escape_quotes(s)),
            Atom::Int(i) => i.to_string(),
            Atom::Float(OrderedFloat(f)) => format!("{f}"),
            Atom::Bool(b) => b.to_string(),
        }
    }

    /// The canonical-form token for this atom: `Tag(value)`, preserving the
    /// runtime type so `Int(42)` never collides with `Float(42)` or
    /// `Str("42")` in the dedup index.
    pub fn canonical_token(&self) -> String {
        format!("{}({})", self.type_tag(), self.render_source())
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_gets_prefixed() {
        assert_eq!(Atom::name("read_file").render_source(), "/read_file");
        assert_eq!(Atom::name("/read_file").render_source(), "/read_file");
    }

    #[test]
    fn canonical_form_preserves_type() {
        let int_tok = Atom::Int(42).canonical_token();
        let float_tok = Atom::try_float(42.0).unwrap().canonical_token();
        let str_tok = Atom::string("42").canonical_token();
        assert_ne!(int_tok, float_tok);
        assert_ne!(int_tok, str_tok);
        assert_ne!(float_tok, str_tok);
    }

    #[test]
    fn nan_float_rejected() {
        assert!(Atom::try_float(f64::NAN).is_none());
    }

    #[test]
    fn string_round_trips_quotes() {
        let a = Atom::string("has \"quotes\"");
        let rendered = a.render_source();
        assert_eq!(rendered, "\"has \\\"quotes\\\"\"");
    }
}
