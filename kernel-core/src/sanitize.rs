//! Pure sanitizer functions (C8). No I/O, no kernel access — these are
//! plain transforms applied at the boundary before a string becomes a
//! fact argument, a mangle update, or a shell command target.

/// Truncate to `max_chars` chars, strip NUL bytes, strip ANSI escape
/// sequences, and strip C0 control bytes except `\n \r \t` — the
/// transform applied to every string argument before it is used to build
/// a `user_intent` fact.
pub fn sanitize_fact_arg(input: &str, max_chars: usize) -> String {
    let stripped = strip_ansi_escapes(input);
    let no_nul: String = stripped.chars().filter(|&c| c != '\0').collect();
    let no_control: String = no_nul
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    truncate_chars(&no_control, max_chars)
}

/// Strip ANSI CSI escape sequences (`ESC '[' ... final-byte`).
fn strip_ansi_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next(); // consume '['
            for next in chars.by_ref() {
                // final byte of a CSI sequence is in 0x40..=0x7E
                if ('\u{40}'..='\u{7e}').contains(&next) {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Reject command-injection-prone input bound for an `Exec` action target.
/// Returns `true` if the input contains a shell metacharacter considered
/// dangerous at the mangle-update boundary: `` ` $ ; | ``.
pub fn contains_shell_metacharacters(input: &str) -> bool {
    input.contains('`') || input.contains('$') || input.contains(';') || input.contains('|')
}

/// Sanitize raw text before it is considered as a candidate command-input
/// target: strips NUL bytes and control characters (keeping common
/// whitespace), same rule as fact arguments but without a length cap.
pub fn sanitize_command_input(input: &str) -> String {
    sanitize_fact_arg(input, usize::MAX)
}

/// Apply the mangle-update rejection rules: not a structural
/// candidate unless it contains `(`, ends with `.`, is non-empty after
/// trim, and carries no shell metacharacter.
pub fn sanitize_mangle_update(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.contains('(') || !trimmed.ends_with('.') {
        return None;
    }
    if contains_shell_metacharacters(trimmed) {
        return None;
    }
    Some(trimmed)
}

/// Normalize a path for the R3/path-traversal constitutional check:
/// forward-slash normalized, `.` segments removed, without resolving
/// symlinks (symlink resolution is the caller's job since it requires a
/// live filesystem).
pub fn normalize_path_for_safety(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut out: Vec<&str> = Vec::new();
    for seg in forward.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                out.push("..");
            }
            other => out.push(other),
        }
    }
    let leading_slash = forward.starts_with('/');
    let joined = out.join("/");
    if leading_slash {
        format!("/{joined}")
    } else {
        joined
    }
}

/// True if any path segment is literally `..` after normalization — used
/// by R3 to flag traversal attempts that survived normalization (e.g. a
/// path that is entirely composed of traversal segments).
pub fn has_traversal_segment(normalized: &str) -> bool {
    normalized.split('/').any(|seg| seg == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nul_and_control() {
        let dirty = "hi\0there\x07\nok";
        let clean = sanitize_fact_arg(dirty, 1000);
        assert_eq!(clean, "hithere\nok");
    }

    #[test]
    fn strips_ansi_csi() {
        let dirty = "\x1b[31mred\x1b[0m text";
        assert_eq!(strip_ansi_escapes(dirty), "red text");
    }

    #[test]
    fn truncates_to_cap() {
        let long = "a".repeat(3000);
        assert_eq!(sanitize_fact_arg(&long, 2048).chars().count(), 2048);
    }

    #[test]
    fn mangle_update_rejects_shell_metachars() {
        assert!(sanitize_mangle_update("pending_action(/a1, /read_file, \"x\").").is_some());
        assert!(sanitize_mangle_update("pending_action(`rm -rf /`).").is_none());
        assert!(sanitize_mangle_update("no_parens_or_dot").is_none());
        assert!(sanitize_mangle_update("   ").is_none());
    }

    #[test]
    fn path_normalization_detects_traversal() {
        let n = normalize_path_for_safety("../../etc/passwd");
        assert!(has_traversal_segment(&n));
        let n2 = normalize_path_for_safety("README.md");
        assert!(!has_traversal_segment(&n2));
    }
}
