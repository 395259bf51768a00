//! Error taxonomy for the logic kernel.

use thiserror::Error;

/// Stage at which a hot-loaded rule was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotLoadStage {
    /// Stage 1: optional repair interceptor rejected the candidate.
    Repair,
    /// Stage 2: sandbox compile failed.
    SandboxCompile,
    /// Stage 3: a body predicate is not declared in the schema.
    SchemaValidation,
    /// Stage 4: infinite-loop risk pattern matched.
    LoopRisk,
}

impl std::fmt::Display for HotLoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HotLoadStage::Repair => "repair",
            HotLoadStage::SandboxCompile => "sandbox_compile",
            HotLoadStage::SchemaValidation => "schema_validation",
            HotLoadStage::LoopRisk => "loop_risk",
        };
        f.write_str(s)
    }
}

/// Reason an evaluation was aborted before committing a derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalFailure {
    /// A syntactic or structural error in the compiled program.
    ParseError(String),
    /// A negated atom referenced a stratum that was not yet fixed.
    Stratification(String),
    /// `derived_count` exceeded the configured gas limit.
    FactExplosion { derived: u64, gas: u64 },
    /// A built-in predicate received arguments of the wrong runtime type.
    TypeError(String),
}

impl std::fmt::Display for EvalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalFailure::ParseError(s) => write!(f, "parse error: {s}"),
            EvalFailure::Stratification(s) => write!(f, "stratification violation: {s}"),
            EvalFailure::FactExplosion { derived, gas } => {
                write!(f, "derived-fact gas exceeded: {derived} > {gas}")
            }
            EvalFailure::TypeError(s) => write!(f, "type error in built-in predicate: {s}"),
        }
    }
}

/// The kernel's unified error type.
///
/// Every operation that can fail returns this; nothing in the kernel core
/// panics on malformed input.
#[derive(Debug, Error)]
pub enum KernelError {
    /// `|EDB| >= max_facts`; the assert was rejected.
    #[error("kernel is full (max_facts reached)")]
    KernelFull,

    /// An argument could not be converted to the evaluator's atom form.
    #[error("atom conversion failed: {0}")]
    AtomConversion(String),

    /// Evaluation was aborted; the previous IDB snapshot was retained.
    #[error("evaluation failed: {0}")]
    EvalFailed(EvalFailure),

    /// A candidate learned rule was rejected by the hot-load pipeline.
    #[error("rule rejected at stage {stage}: {reason}")]
    RuleRejected {
        /// Pipeline stage that rejected the rule.
        stage: HotLoadStage,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// The articulation parser could not extract a control packet.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A parsed envelope failed schema/field validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A mangle-update or fact argument failed atom parsing.
    #[error("malformed atom: {0}")]
    MalformedAtom(String),

    /// A constitutional rule denied the action before the kernel was queried.
    #[error("constitutional deny: rule {rule_id}")]
    ConstitutionalDeny {
        /// Identifier of the rule that denied (`r1`..`r4`).
        rule_id: &'static str,
    },

    /// The kernel's `permitted/3` query did not derive permission.
    #[error("permission denied")]
    PermissionDenied,

    /// A caller attempted to re-enter the kernel's write path while holding it.
    #[error("reentrant kernel access")]
    Reentrancy,

    /// Too many `next_action` derivations were triggered within one turn.
    #[error("runaway halt: turn {turn} produced {count} derivations")]
    RunawayHalt {
        /// Turn counter at the time of the halt.
        turn: u64,
        /// Number of `next_action` derivations observed.
        count: u64,
    },

    /// A context build would exceed the configured token budget.
    #[error("token budget overrun: {used} > {budget}")]
    BudgetOverrun {
        /// Tokens the context would have used.
        used: u64,
        /// Configured total budget.
        budget: u64,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// An operation was cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying I/O failure (diagnostics sink, learned-rules log, state file).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Underlying (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Underlying configuration parse failure.
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// Convenience alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, KernelError>;

impl KernelError {
    /// Stable, internals-free label suitable for surfacing to an end user.
    ///
    /// The detailed `Display` text is for the diagnostics log only.
    pub fn user_kind(&self) -> &'static str {
        match self {
            KernelError::KernelFull => "kernel_full",
            KernelError::AtomConversion(_) => "atom_conversion",
            KernelError::EvalFailed(_) => "eval_failed",
            KernelError::RuleRejected { .. } => "rule_rejected",
            KernelError::ParseError(_) => "parse_error",
            KernelError::ValidationError(_) => "validation_error",
            KernelError::MalformedAtom(_) => "malformed_atom",
            KernelError::ConstitutionalDeny { .. } => "constitutional_deny",
            KernelError::PermissionDenied => "permission_denied",
            KernelError::Reentrancy => "reentrancy",
            KernelError::RunawayHalt { .. } => "runaway_halt",
            KernelError::BudgetOverrun { .. } => "budget_overrun",
            KernelError::TimedOut(_) => "timed_out",
            KernelError::Cancelled => "cancelled",
            KernelError::Io(_) => "io_error",
            KernelError::Serialization(_) => "serialization_error",
            KernelError::Config(_) => "config_error",
        }
    }
}
