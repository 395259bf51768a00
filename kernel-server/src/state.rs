//! Application state

use kernel_core::gate::ControlGate;
use kernel_core::kernel::Kernel;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The fact store and evaluator
    pub kernel: Arc<Kernel>,

    /// The control gate dispatch sits behind
    pub gate: Arc<ControlGate>,

    /// Server start time
    pub start_time: Instant,

    /// Debug mode flag
    pub debug: bool,
}

impl AppState {
    /// Create new application state
    pub fn new(kernel: Arc<Kernel>, gate: Arc<ControlGate>) -> Self {
        Self {
            kernel,
            gate,
            start_time: Instant::now(),
            debug: false,
        }
    }

    /// Create application state with debug mode
    pub fn with_debug(kernel: Arc<Kernel>, gate: Arc<ControlGate>, debug: bool) -> Self {
        Self {
            kernel,
            gate,
            start_time: Instant::now(),
            debug,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
