//! Boot-time configuration, loaded once from TOML and read-only thereafter
//! unless explicitly reloaded via a kernel operation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide limits (C8), activation weight caps (C6), token-budget
/// reserves (C7), and filesystem locations the kernel writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Maximum number of facts resident in the EDB at once.
    pub max_facts_in_kernel: u64,
    /// Derived-fact gas cap applied to every evaluation.
    pub derived_fact_gas: u64,
    /// Maximum concurrently active shards (enforced externally; informational here).
    pub max_concurrent_shards: u32,
    /// Maximum session duration in minutes (enforced externally; informational here).
    pub max_session_duration_minutes: u32,
    /// Scanner buffer size for streaming LM output, in bytes.
    pub scanner_buffer_bytes: u64,
    /// Maximum HTTP response body size accepted from an LM provider, in bytes.
    pub http_response_body_bytes: u64,
    /// Maximum length of a regex input accepted by the perception layer.
    pub regex_input_chars: u64,
    /// Maximum UI input length, in characters.
    pub ui_input_char_limit: u64,

    /// Embedded-scanner depth cap for the articulation parser.
    pub scanner_max_depth: u32,
    /// Embedded-scanner per-candidate byte cap.
    pub scanner_max_candidate_bytes: u64,

    /// Activation engine weight caps, one per component.
    pub activation_caps: ActivationCaps,
    /// Token budget configuration.
    pub token_budget: TokenBudgetConfig,

    /// Directory diagnostics dumps (compile-failure program sources,
    /// structured event logs) are written to.
    pub diagnostics_dir: PathBuf,
    /// Directory per-session persisted state and learned-rules logs live in.
    pub session_dir: PathBuf,

    /// Runaway-halt cap: max `next_action` derivations per turn before dispatch
    /// is suspended for the rest of that turn.
    pub runaway_halt_threshold: u64,

    /// Names always present in the `Exec` environment allowlist in addition
    /// to any deployer-configured extras.
    pub exec_env_allowlist: Vec<String>,
}

/// Per-component caps for the activation engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationCaps {
    /// Cap on the base-priority component.
    pub base: f64,
    /// Cap on the recency component.
    pub recency: f64,
    /// Cap on the relevance component.
    pub relevance: f64,
    /// Cap on the dependency component.
    pub dependency: f64,
    /// Cap on the campaign component.
    pub campaign: f64,
    /// Cap on the session component.
    pub session: f64,
    /// Cap on the issue component.
    pub issue: f64,
    /// Cap on the summed total.
    pub total: f64,
}

impl Default for ActivationCaps {
    fn default() -> Self {
        ActivationCaps {
            base: 100.0,
            recency: 50.0,
            relevance: 80.0,
            dependency: 40.0,
            campaign: 60.0,
            session: 15.0,
            issue: 80.0,
            total: 100.0,
        }
    }
}

/// Token budget reserves and compression policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgetConfig {
    /// Total token budget per context build.
    pub total: u64,
    /// Fraction reserved for the core (system prompt, invariants).
    pub core_fraction: f64,
    /// Fraction reserved for retained atoms.
    pub atoms_fraction: f64,
    /// Fraction reserved for rolling-summary history.
    pub history_fraction: f64,
    /// Fraction reserved for in-progress working content.
    pub working_fraction: f64,
    /// Utilization threshold at/above which `should_compress()` is true.
    pub compress_threshold: f64,
    /// Target compression ratio enforced on the generated summary.
    pub target_ratio: f64,
    /// Age (minutes) beyond which fact recency decays to zero.
    pub recency_decay_minutes: u64,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        TokenBudgetConfig {
            total: 200_000,
            core_fraction: 0.05,
            atoms_fraction: 0.30,
            history_fraction: 0.15,
            working_fraction: 0.50,
            compress_threshold: 0.6,
            target_ratio: 4.0,
            recency_decay_minutes: 30,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_facts_in_kernel: 250_000,
            derived_fact_gas: 500_000,
            max_concurrent_shards: 12,
            max_session_duration_minutes: 120,
            scanner_buffer_bytes: 1_000_000,
            http_response_body_bytes: 10_000_000,
            regex_input_chars: 2_000,
            ui_input_char_limit: 100_000,
            scanner_max_depth: 200,
            scanner_max_candidate_bytes: 5 * 1024 * 1024,
            activation_caps: ActivationCaps::default(),
            token_budget: TokenBudgetConfig::default(),
            diagnostics_dir: PathBuf::from("./diagnostics"),
            session_dir: PathBuf::from("./sessions"),
            runaway_halt_threshold: 50,
            exec_env_allowlist: vec!["PATH".to_string(), "HOME".to_string()],
        }
    }
}

impl KernelConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
