//! Logic Kernel Core — a neuro-symbolic reasoning substrate combining a
//! stratified-Datalog fact store, a constitutional control gate, an
//! envelope-parsing articulation layer, a spreading-activation scorer, and
//! a token-budgeted context compressor.

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

pub mod activation;
pub mod articulation;
pub mod atom;
pub mod compressor;
pub mod config;
pub mod datalog;
pub mod diagnostics;
pub mod error;
pub mod fact;
pub mod gate;
pub mod hotload;
pub mod kernel;
pub mod metrics;
pub mod sanitize;
pub mod syntax;
pub mod tracing_setup;

pub use activation::{score as activation_score, select as activation_select, ScoringContext};
pub use articulation::{
    build_user_intent_fact, parse as parse_envelope, ArticulationConfig, ControlPacket, IntentClassification, MemoryOp,
    MemoryOperation, ParseResult,
};
pub use atom::Atom;
pub use compressor::{
    apply_memory_operations, extract_atoms, BudgetCategory, CompressedState, CompressedTurn, Compressor, ContextBlock,
    LMClient, MemoryStore, TokenBudget,
};
pub use config::{ActivationCaps, KernelConfig, TokenBudgetConfig};
pub use datalog::{Program, Rule};
pub use error::{KernelError, Result};
pub use fact::Fact;
pub use gate::{ActionHandler, ActionKind, ActionRequest, ControlGate, DispatchOutcome};
pub use kernel::{Kernel, SelfHealReport};

/// Crate version, surfaced over the HTTP API and in diagnostics dumps.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
