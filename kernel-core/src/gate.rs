//! The Control Gate (C5): parses action requests, runs constitutional
//! checks ahead of the kernel's own `permitted/3` query, dispatches
//! approved actions, and injects the result back into the kernel.

use crate::atom::Atom;
use crate::error::{KernelError, Result};
use crate::fact::Fact;
use crate::kernel::Kernel;
use crate::sanitize;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The kind of action a dispatch request targets. `Other` lets a deployer
/// register action kinds this crate does not name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ReadFile,
    WriteFile,
    EditFile,
    DeleteFile,
    Exec,
    Mkdir,
    Search,
    Net,
    Other(String),
}

impl ActionKind {
    fn as_atom_name(&self) -> String {
        match self {
            ActionKind::ReadFile => "read_file".to_string(),
            ActionKind::WriteFile => "write_file".to_string(),
            ActionKind::EditFile => "edit_file".to_string(),
            ActionKind::DeleteFile => "delete_file".to_string(),
            ActionKind::Exec => "exec".to_string(),
            ActionKind::Mkdir => "mkdir".to_string(),
            ActionKind::Search => "search".to_string(),
            ActionKind::Net => "net".to_string(),
            ActionKind::Other(s) => s.clone(),
        }
    }
}

/// A request to take an action, already parsed from a mangle update or a
/// tool request.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action_id: String,
    pub kind: ActionKind,
    pub target: String,
    pub payload: serde_json::Value,
    pub context: HashMap<String, String>,
}

/// Outcome of running an `ActionRequest` through the gate.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Dispatched { summary: String },
    Denied { rule_id: &'static str, reason: String },
    PermissionDenied,
}

/// External handler invoked once an action clears both constitutional
/// checks and the kernel's permission query. Must not be called while the
/// gate or kernel write lock is held.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, request: &ActionRequest, env: &HashMap<String, String>) -> Result<String>;
}

fn nfkc_lower(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// R1: lowercased, case-folded target must not contain a known
/// destructive command substring.
fn rule_r1_no_destructive_command(req: &ActionRequest) -> Option<String> {
    if req.kind != ActionKind::Exec {
        return None;
    }
    let normalized = nfkc_lower(&req.target);
    const DANGEROUS: &[&str] = &["rm -rf", "mkfs", "dd if=", ":(){ ", "chmod 777"];
    DANGEROUS
        .iter()
        .find(|needle| normalized.contains(*needle))
        .map(|needle| format!("target contains destructive command pattern: {needle}"))
}

/// R2: payload must not combine a secret keyword with an exfiltration tool.
fn rule_r2_no_secret_exfiltration(req: &ActionRequest) -> Option<String> {
    let stringified = nfkc_lower(&format!("{} {}", req.target, req.payload));
    const SECRET_WORDS: &[&str] = &[".env", "credentials", "secret", "api_key", "password"];
    const EXFIL_TOOLS: &[&str] = &["curl", "wget", "nc ", "netcat"];
    let has_secret = SECRET_WORDS.iter().any(|w| stringified.contains(w));
    let has_tool = EXFIL_TOOLS.iter().any(|w| stringified.contains(w));
    if has_secret && has_tool {
        Some("payload combines a secret keyword with an exfiltration tool".to_string())
    } else {
        None
    }
}

const FILE_KINDS: &[ActionKind] = &[ActionKind::ReadFile, ActionKind::WriteFile, ActionKind::EditFile, ActionKind::DeleteFile];

/// R3: reject path traversal and absolute paths that escape the workspace.
fn rule_r3_path_traversal(req: &ActionRequest, workspace_root: &str) -> Option<String> {
    if !FILE_KINDS.contains(&req.kind) {
        return None;
    }
    let normalized = sanitize::normalize_path_for_safety(&req.target);
    if sanitize::has_traversal_segment(&normalized) {
        return Some("path contains a '..' segment".to_string());
    }
    if normalized.starts_with('/') && !normalized.starts_with(workspace_root) {
        return Some("absolute path escapes the workspace root".to_string());
    }
    None
}

const WRITE_KINDS: &[ActionKind] = &[ActionKind::WriteFile, ActionKind::EditFile, ActionKind::DeleteFile];

/// R4: reject writes targeting well-known system directories.
fn rule_r4_no_system_file_modification(req: &ActionRequest) -> Option<String> {
    if !WRITE_KINDS.contains(&req.kind) {
        return None;
    }
    let normalized = req.target.replace('\\', "/").to_lowercase();
    const SYSTEM_PREFIXES: &[&str] = &[
        "/etc/", "/usr/", "/bin/", "/sbin/", "/var/", "/root/",
        "c:/windows/", "c:/program files/", "c:/programdata/",
    ];
    SYSTEM_PREFIXES
        .iter()
        .find(|p| normalized.starts_with(**p))
        .map(|p| format!("target is under a protected system path: {p}"))
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct CacheKey {
    action: String,
    target: String,
    payload_hash: u64,
}

struct CacheEntry {
    generation: u64,
    permitted: bool,
}

/// The Control Gate.
pub struct ControlGate {
    kernel: Arc<Kernel>,
    handlers: DashMap<ActionKind, Arc<dyn ActionHandler>>,
    permission_cache: DashMap<CacheKey, CacheEntry>,
    workspace_root: String,
    exec_env_allowlist: Vec<String>,
    runaway_halt_threshold: u64,
    turn_derivation_count: AtomicU64,
    current_turn: AtomicU64,
    session_started: AtomicBool,
    dispatch_suspended_this_turn: AtomicBool,
}

impl ControlGate {
    pub fn new(kernel: Arc<Kernel>, workspace_root: String, exec_env_allowlist: Vec<String>, runaway_halt_threshold: u64) -> Self {
        ControlGate {
            kernel,
            handlers: DashMap::new(),
            permission_cache: DashMap::new(),
            workspace_root,
            exec_env_allowlist,
            runaway_halt_threshold,
            turn_derivation_count: AtomicU64::new(0),
            current_turn: AtomicU64::new(0),
            session_started: AtomicBool::new(false),
            dispatch_suspended_this_turn: AtomicBool::new(false),
        }
    }

    /// Register a handler for an `ActionKind`. Overwrites any previous
    /// registration for that kind.
    pub fn register_handler(&self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Mark the first user input of the session as having arrived,
    /// lifting the boot guard.
    pub fn mark_session_started(&self) {
        self.session_started.store(true, Ordering::Release);
    }

    /// Advance to a new turn, resetting the runaway-halt counter and the
    /// dispatch-suspended flag.
    pub fn begin_turn(&self, turn: u64) {
        self.current_turn.store(turn, Ordering::Release);
        self.turn_derivation_count.store(0, Ordering::Release);
        self.dispatch_suspended_this_turn.store(false, Ordering::Release);
    }

    fn run_constitutional_rules(&self, req: &ActionRequest) -> Option<(&'static str, String)> {
        if let Some(reason) = rule_r1_no_destructive_command(req) {
            return Some(("r1", reason));
        }
        if let Some(reason) = rule_r2_no_secret_exfiltration(req) {
            return Some(("r2", reason));
        }
        if let Some(reason) = rule_r3_path_traversal(req, &self.workspace_root) {
            return Some(("r3", reason));
        }
        if let Some(reason) = rule_r4_no_system_file_modification(req) {
            return Some(("r4", reason));
        }
        None
    }

    fn assert_security_violation(&self, req: &ActionRequest, rule_id: &'static str, reason: &str) {
        let fact = Fact::new(
            "security_violation",
            vec![
                Atom::string(req.action_id.clone()),
                Atom::name(rule_id),
                Atom::string(reason.to_string()),
                Atom::Int(self.current_turn.load(Ordering::Acquire) as i64),
            ],
        );
        let _ = self.kernel.assert(fact);
    }

    fn query_permission(&self, req: &ActionRequest) -> Result<bool> {
        let payload_text = req.payload.to_string();
        let key = CacheKey {
            action: req.kind.as_atom_name(),
            target: req.target.clone(),
            payload_hash: Fact::new("_", vec![Atom::string(payload_text.clone())]).hash_key(),
        };
        let generation = self.kernel.policy_generation();
        if let Some(entry) = self.permission_cache.get(&key) {
            if entry.generation == generation {
                return Ok(entry.permitted);
            }
        }

        let args = vec![Atom::name(&req.kind.as_atom_name()), Atom::string(req.target.clone()), Atom::string(payload_text)];
        let permitted = self.kernel.query_bool("permitted", &args)?;
        self.permission_cache.insert(key, CacheEntry { generation, permitted });
        Ok(permitted)
    }

    fn build_exec_env(&self, req: &ActionRequest) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for name in &self.exec_env_allowlist {
            if let Ok(v) = std::env::var(name) {
                env.insert(name.clone(), v);
            }
        }
        for (k, v) in &req.context {
            if self.exec_env_allowlist.contains(k) {
                env.insert(k.clone(), v.clone());
            }
        }
        env
    }

    /// Parse, check, query, dispatch, and inject the result for one
    /// action request.
    pub fn process(&self, req: ActionRequest) -> Result<DispatchOutcome> {
        if !self.session_started.load(Ordering::Acquire) {
            let fact = Fact::new("boot_guard_blocked", vec![Atom::string(req.action_id.clone())]);
            let _ = self.kernel.assert(fact);
            return Ok(DispatchOutcome::Denied { rule_id: "boot_guard", reason: "session not yet started".to_string() });
        }

        if self.dispatch_suspended_this_turn.load(Ordering::Acquire) {
            return Ok(DispatchOutcome::Denied { rule_id: "runaway_halt", reason: "dispatch suspended for this turn".to_string() });
        }

        if let Some((rule_id, reason)) = self.run_constitutional_rules(&req) {
            self.assert_security_violation(&req, rule_id, &reason);
            return Ok(DispatchOutcome::Denied { rule_id, reason });
        }

        if !self.query_permission(&req)? {
            return Ok(DispatchOutcome::PermissionDenied);
        }

        let env = self.build_exec_env(&req);
        let handler = self.handlers.get(&req.kind);
        let result = match handler {
            Some(h) => h.handle(&req, &env),
            None => Err(KernelError::ValidationError(format!("no handler registered for {:?}", req.kind))),
        };

        let (status, summary) = match &result {
            Ok(summary) => ("ok", summary.clone()),
            Err(e) => ("error", e.to_string()),
        };
        let result_fact = Fact::new(
            "execution_result",
            vec![Atom::string(req.action_id.clone()), Atom::name(status), Atom::string(summary.clone())],
        );
        self.kernel.assert(result_fact)?;

        self.check_runaway_halt()?;

        result.map(|summary| DispatchOutcome::Dispatched { summary })
    }

    fn check_runaway_halt(&self) -> Result<()> {
        let next_actions = self.kernel.query("next_action")?;
        let count = self.turn_derivation_count.fetch_add(next_actions.len() as u64, Ordering::AcqRel) + next_actions.len() as u64;
        if count > self.runaway_halt_threshold {
            self.dispatch_suspended_this_turn.store(true, Ordering::Release);
            let turn = self.current_turn.load(Ordering::Acquire);
            let fact = Fact::new("runaway_halt", vec![Atom::Int(turn as i64), Atom::Int(count as i64)]);
            let _ = self.kernel.assert(fact);
            return Err(KernelError::RunawayHalt { turn, count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use std::sync::Mutex;

    struct EchoHandler(Mutex<Vec<String>>);

    impl ActionHandler for EchoHandler {
        fn handle(&self, req: &ActionRequest, _env: &HashMap<String, String>) -> Result<String> {
            self.0.lock().unwrap().push(req.target.clone());
            Ok(format!("read {}", req.target))
        }
    }

    fn gate_with_permit_rule() -> ControlGate {
        let rule = crate::syntax::parse_rule_text(
            "permitted(A, T, P) :- safe_action(A).",
        )
        .unwrap();
        let kernel = Arc::new(Kernel::new(vec![rule], HashMap::new(), Arc::new(KernelConfig::default())));
        let gate = ControlGate::new(kernel, "/workspace".to_string(), vec!["PATH".to_string()], 50);
        gate.mark_session_started();
        gate
    }

    fn read_request(target: &str) -> ActionRequest {
        ActionRequest {
            action_id: "a1".to_string(),
            kind: ActionKind::ReadFile,
            target: target.to_string(),
            payload: serde_json::json!({}),
            context: HashMap::new(),
        }
    }

    #[test]
    fn permit_path_dispatches_and_injects_result() {
        let gate = gate_with_permit_rule();
        gate.kernel.assert(Fact::new("safe_action", vec![Atom::name("read_file")])).unwrap();
        gate.register_handler(ActionKind::ReadFile, Arc::new(EchoHandler(Mutex::new(Vec::new()))));
        let outcome = gate.process(read_request("README")).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));
        let results = gate.kernel.query("execution_result").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn path_traversal_denies_before_permission_query() {
        let gate = gate_with_permit_rule();
        gate.kernel.assert(Fact::new("safe_action", vec![Atom::name("read_file")])).unwrap();
        let outcome = gate.process(read_request("../../etc/passwd")).unwrap();
        match outcome {
            DispatchOutcome::Denied { rule_id, .. } => assert_eq!(rule_id, "r3"),
            other => panic!("expected R3 denial, got {other:?}"),
        }
        let violations = gate.kernel.query("security_violation").unwrap();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn boot_guard_blocks_before_session_start() {
        let rule = crate::syntax::parse_rule_text("permitted(A, T, P) :- safe_action(A).").unwrap();
        let kernel = Arc::new(Kernel::new(vec![rule], HashMap::new(), Arc::new(KernelConfig::default())));
        let gate = ControlGate::new(kernel, "/workspace".to_string(), vec![], 50);
        let outcome = gate.process(read_request("README")).unwrap();
        match outcome {
            DispatchOutcome::Denied { rule_id, .. } => assert_eq!(rule_id, "boot_guard"),
            other => panic!("expected boot guard denial, got {other:?}"),
        }
    }

    #[test]
    fn permission_denied_without_safe_action_fact() {
        let gate = gate_with_permit_rule();
        let outcome = gate.process(read_request("README")).unwrap();
        assert!(matches!(outcome, DispatchOutcome::PermissionDenied));
    }

    #[test]
    fn system_path_write_denied_by_r4() {
        let gate = gate_with_permit_rule();
        let req = ActionRequest {
            action_id: "a2".to_string(),
            kind: ActionKind::WriteFile,
            target: "/etc/passwd".to_string(),
            payload: serde_json::json!({}),
            context: HashMap::new(),
        };
        let outcome = gate.process(req).unwrap();
        match outcome {
            DispatchOutcome::Denied { rule_id, .. } => assert_eq!(rule_id, "r4"),
            other => panic!("expected R4 denial, got {other:?}"),
        }
    }
}
