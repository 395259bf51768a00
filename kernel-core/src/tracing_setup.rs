//! Tracing and logging setup for the logic kernel.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize tracing with default configuration.
pub fn init_tracing() {
    init_tracing_with_config(TracingConfig::default());
}

/// Initialize tracing with custom configuration.
pub fn init_tracing_with_config(config: TracingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_level.clone()));

    let fmt_layer = fmt::layer()
        .with_span_events(config.span_events.clone())
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_thread_names(config.show_thread_names)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    if config.json_output {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(config.span_events)
            .with_target(true)
            .with_thread_ids(true);
        subscriber.with(json_layer).init();
    } else {
        subscriber.init();
    }
}

/// Resolve a preset from the `KERNEL_ENV` environment variable, defaulting
/// to [`TracingConfig::default`] when unset or unrecognized.
pub fn config_from_env() -> TracingConfig {
    match std::env::var("KERNEL_ENV").as_deref() {
        Ok("production") => TracingConfig::production(),
        Ok("verbose") => TracingConfig::verbose(),
        _ => TracingConfig::default(),
    }
}

/// Tracing configuration, mirroring the five structured-event targets the
/// kernel emits under: `kernel`, `articulation`, `gate`, `context`, `activation`.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub default_level: String,
    pub span_events: FmtSpan,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    pub show_file: bool,
    pub show_line_number: bool,
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig {
            default_level: "kernel=debug,info".to_string(),
            span_events: FmtSpan::CLOSE,
            show_target: true,
            show_thread_ids: false,
            show_thread_names: false,
            show_file: false,
            show_line_number: false,
            json_output: false,
        }
    }
}

impl TracingConfig {
    pub fn production() -> Self {
        TracingConfig {
            default_level: "kernel=info,warn".to_string(),
            span_events: FmtSpan::NONE,
            show_target: true,
            show_thread_ids: false,
            show_thread_names: false,
            show_file: false,
            show_line_number: false,
            json_output: true,
        }
    }

    pub fn verbose() -> Self {
        TracingConfig {
            default_level: "kernel=trace,debug".to_string(),
            span_events: FmtSpan::ENTER | FmtSpan::EXIT | FmtSpan::CLOSE,
            show_target: true,
            show_thread_ids: true,
            show_thread_names: true,
            show_file: true,
            show_line_number: true,
            json_output: false,
        }
    }

    pub fn min_level(&self) -> Level {
        if self.default_level.contains("trace") {
            Level::TRACE
        } else if self.default_level.contains("debug") {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

#[macro_export]
macro_rules! trace_assert {
    ($fact:expr, $accepted:expr) => {
        tracing::debug!(target: "kernel", fact = %$fact, accepted = $accepted, "assert");
    };
}

#[macro_export]
macro_rules! trace_evaluation {
    ($derived:expr, $duration:expr) => {
        tracing::debug!(
            target: "kernel",
            derived = $derived,
            duration_ms = $duration.as_millis() as u64,
            "evaluation completed"
        );
    };
}

#[macro_export]
macro_rules! trace_dispatch {
    ($kind:expr, $outcome:expr) => {
        tracing::info!(target: "gate", kind = ?$kind, outcome = ?$outcome, "dispatch");
    };
}

#[macro_export]
macro_rules! trace_hot_load {
    ($stage:expr, $outcome:expr) => {
        tracing::info!(target: "kernel", stage = %$stage, outcome = $outcome, "hot-load");
    };
}

#[macro_export]
macro_rules! trace_compression {
    ($ratio:expr, $turns_compressed:expr) => {
        tracing::info!(target: "context", ratio = $ratio, turns_compressed = $turns_compressed, "context compressed");
    };
}
