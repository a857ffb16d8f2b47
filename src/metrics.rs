use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;

    register_metrics();
    Ok(handle)
}

/// Pre-register metrics so they appear even before the first increment.
pub fn register_metrics() {
    for name in [
        "fills_received_total",
        "fills_snapshot_skipped_total",
        "trades_copied_total",
        "trades_skipped_total",
        "trades_rejected_total",
        "orders_failed_total",
        "ws_reconnects_total",
        "health_checks_total",
    ] {
        counter!(name).absolute(0);
    }

    gauge!("active_trades").set(0.0);
    gauge!("drift_coins").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("fill_processing_seconds").record(0.0);
}
