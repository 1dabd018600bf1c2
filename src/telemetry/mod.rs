//! Telemetry initialization: structured logging and metrics

pub mod metrics;

use crate::config::TelemetryConfig;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise logging and, when enabled, the Prometheus recorder.
///
/// Returns `Some(PrometheusHandle)` when metrics are enabled so the embedding
/// server can expose a scrape endpoint.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<Option<PrometheusHandle>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flight_auth=info".into());

    let prometheus_handle = if config.metrics_enabled {
        let handle = metrics::install_prometheus_recorder()?;
        metrics::describe_metrics();
        Some(handle)
    } else {
        None
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        // Keep `message` top-level rather than nested under `fields`
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true);
        registry
            .with(fmt_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(prometheus_handle)
}
