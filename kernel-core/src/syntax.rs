//! Text-form parsing shared by hot-loaded rule text and mangle-update
//! atom text: `predicate(arg {, arg})\.` and `head :- body.`
//!
//! This is a hand-written recursive-descent parser in the style of the
//! workspace's own prior `.rune`-file parser: paren-depth-aware top-level
//! splitting, not a parser-combinator crate, since the grammar is small
//! and fixed.

use crate::atom::Atom;
use crate::datalog::{Rule, RuleAtom, Term};
use crate::error::{KernelError, Result};

/// Parse one ground fact in source form: `predicate(arg, ...).`
/// Used for mangle updates, which must be fully ground (no variables).
pub fn parse_fact_text(input: &str) -> Result<(String, Vec<Atom>)> {
    let trimmed = input.trim().trim_end_matches('.').trim();
    let (predicate, args) = split_predicate_and_args(trimmed)?;
    let atoms = args
        .iter()
        .map(|a| parse_ground_term(a))
        .collect::<Result<Vec<_>>>()?;
    Ok((predicate, atoms))
}

/// Parse a rule: `head :- body1, body2, ....` or a bare fact `head.`
pub fn parse_rule_text(input: &str) -> Result<Rule> {
    let trimmed = input.trim().trim_end_matches('.').trim();
    if let Some((head_src, body_src)) = split_once_top_level(trimmed, ":-") {
        let head = parse_rule_atom(head_src.trim())?;
        let body_atoms = split_preserving_parens(body_src.trim())
            .into_iter()
            .map(|a| parse_rule_atom(a.trim()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Rule::new(head, body_atoms))
    } else {
        Ok(Rule::fact(parse_rule_atom(trimmed)?))
    }
}

fn parse_rule_atom(src: &str) -> Result<RuleAtom> {
    let mut negated = false;
    let mut s = src.trim();
    if let Some(rest) = s.strip_prefix('!') {
        negated = true;
        s = rest.trim();
    } else if let Some(rest) = s.strip_prefix("not ") {
        negated = true;
        s = rest.trim();
    }
    let (predicate, args) = split_predicate_and_args(s)?;
    let terms = args
        .iter()
        .map(|a| parse_term(a))
        .collect::<Result<Vec<_>>>()?;
    Ok(RuleAtom { predicate: predicate.into(), terms, negated })
}

fn split_predicate_and_args(s: &str) -> Result<(String, Vec<String>)> {
    let open = s
        .find('(')
        .ok_or_else(|| KernelError::MalformedAtom(format!("missing '(' in: {s}")))?;
    if !s.ends_with(')') {
        return Err(KernelError::MalformedAtom(format!("missing ')' in: {s}")));
    }
    let predicate = s[..open].trim().to_string();
    if predicate.is_empty() {
        return Err(KernelError::MalformedAtom(format!("empty predicate in: {s}")));
    }
    let inner = &s[open + 1..s.len() - 1];
    let args = split_preserving_parens(inner)
        .into_iter()
        .filter(|a| !a.trim().is_empty())
        .collect();
    Ok((predicate, args))
}

/// Split a comma-separated argument list at top level only: commas inside
/// nested parens or quoted strings do not split.
fn split_preserving_parens(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    let mut current = String::new();
    for c in s.chars() {
        if escape {
            current.push(c);
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                current.push(c);
                escape = true;
            }
            '"' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth -= 1;
                current.push(c);
            }
            ',' if !in_string && depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn split_once_top_level<'a>(s: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let mut depth = 0i32;
    let mut in_string = false;
    let bytes = s.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth -= 1,
            _ => {}
        }
        if !in_string
            && depth == 0
            && i + sep_bytes.len() <= bytes.len()
            && &bytes[i..i + sep_bytes.len()] == sep_bytes
        {
            return Some((&s[..i], &s[i + sep_bytes.len()..]));
        }
        i += 1;
    }
    None
}

fn is_variable_name(s: &str) -> bool {
    matches!(s.chars().next(), Some(c) if c.is_ascii_uppercase() || c == '_')
}

fn parse_term(s: &str) -> Result<Term> {
    let s = s.trim();
    if is_variable_name(s) {
        return Ok(Term::Variable(s.to_string()));
    }
    Ok(Term::Constant(parse_ground_term(s)?))
}

fn parse_ground_term(s: &str) -> Result<Atom> {
    let s = s.trim();
    if s.is_empty() {
        return Err(KernelError::MalformedAtom("empty argument".to_string()));
    }
    if let Some(name) = s.strip_prefix('/') {
        if name.is_empty() {
            return Err(KernelError::MalformedAtom("bare '/' name constant".to_string()));
        }
        return Ok(Atom::Name(std::sync::Arc::from(s)));
    }
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        let inner = &s[1..s.len() - 1];
        return Ok(Atom::string(unescape(inner)));
    }
    if s == "true" || s == "false" {
        return Ok(Atom::Bool(s == "true"));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Atom::Int(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Atom::try_float(f)
            .ok_or_else(|| KernelError::MalformedAtom("NaN float literal".to_string()));
    }
    if is_variable_name(s) {
        return Err(KernelError::MalformedAtom(format!(
            "unexpected variable in ground context: {s}"
        )));
    }
    // Bare identifier: treated as a string constant.
    Ok(Atom::string(s))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}
