//! Prometheus exporter wiring for the kernel HTTP server.
//!
//! Metric descriptions and recording helpers live in `kernel_core::metrics`
//! so the CLI and server emit identical names; this module only owns the
//! exporter handle and the render endpoint.

use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
    OnceLock::new();

/// Install the global Prometheus recorder. Must be called exactly once,
/// before any metric is recorded.
pub fn init_prometheus() -> anyhow::Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;
    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("prometheus handle already set"))?;
    Ok(())
}

/// Render the current metrics snapshot in Prometheus text exposition format.
pub fn get_prometheus_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# prometheus exporter not initialized\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn setup() {
        INIT.call_once(|| {
            let _ = init_prometheus();
            kernel_core::metrics::init_metrics();
        });
    }

    #[test]
    fn render_does_not_panic_once_initialized() {
        setup();
        let rendered = get_prometheus_metrics();
        let _ = rendered;
    }
}
