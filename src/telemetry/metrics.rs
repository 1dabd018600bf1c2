//! Prometheus metrics setup and metric definitions

use anyhow::Context;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Authentication attempts by scheme, call kind and result
pub const AUTH_ATTEMPTS_TOTAL: &str = "flight_auth_attempts_total";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines from startup.
pub fn describe_metrics() {
    describe_counter!(
        AUTH_ATTEMPTS_TOTAL,
        "Total number of gRPC authentication attempts"
    );

    for scheme in ["handshake", "basic_bearer"] {
        for kind in ["unary", "stream"] {
            for result in ["success", "rejected"] {
                counter!(AUTH_ATTEMPTS_TOTAL, "scheme" => scheme, "kind" => kind, "result" => result)
                    .absolute(0);
            }
        }
    }
    for result in ["success", "rejected"] {
        counter!(AUTH_ATTEMPTS_TOTAL, "scheme" => "basic_bearer", "kind" => "handshake", "result" => result)
            .absolute(0);
    }
}

/// Count one authentication attempt
pub fn record_auth_attempt(scheme: &'static str, kind: &'static str, result: &'static str) {
    counter!(AUTH_ATTEMPTS_TOTAL, "scheme" => scheme, "kind" => kind, "result" => result)
        .increment(1);
}
