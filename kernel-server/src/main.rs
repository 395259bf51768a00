//! Logic Kernel HTTP Server binary

use axum::{
    routing::{get, post},
    Router,
};
use kernel_core::config::KernelConfig;
use kernel_core::gate::ControlGate;
use kernel_core::kernel::Kernel;
use kernel_server::{handlers, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kernel_core::tracing_setup::init_tracing_with_config(kernel_core::tracing_setup::config_from_env());

    info!("Starting Logic Kernel HTTP Server v{}", env!("CARGO_PKG_VERSION"));

    kernel_server::metrics::init_prometheus()?;
    kernel_core::metrics::init_metrics();

    let config = match std::env::var("KERNEL_CONFIG") {
        Ok(path) => KernelConfig::load(&path)?,
        Err(_) => KernelConfig::default(),
    };
    let config = Arc::new(config);

    let kernel = Arc::new(Kernel::new(Vec::new(), HashMap::new(), config.clone()));
    let workspace_root = std::env::var("KERNEL_WORKSPACE_ROOT").unwrap_or_else(|_| ".".to_string());
    let gate = Arc::new(ControlGate::new(
        kernel.clone(),
        workspace_root,
        config.exec_env_allowlist.clone(),
        config.runaway_halt_threshold,
    ));
    gate.mark_session_started();

    let debug = std::env::var("DEBUG").is_ok();
    let state = AppState::with_debug(kernel, gate, debug);

    let app = Router::new()
        .route("/v1/assert", post(handlers::assert))
        .route("/v1/retract", post(handlers::retract))
        .route("/v1/query", post(handlers::query))
        .route("/v1/hot_load", post(handlers::hot_load))
        .route("/v1/dispatch", post(handlers::dispatch))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("BIND_ADDRESS")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, shutting down gracefully");
    };

    server
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

    info!("server shutdown complete");
    Ok(())
}
