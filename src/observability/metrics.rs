//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, handshakes, issuance, state)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `mgmt_requests_total` (counter): requests by surface, status
//! - `mgmt_request_duration_seconds` (histogram): latency by surface
//! - `mgmt_tls_handshake_failures_total` (counter): rejected secured connections
//! - `mgmt_certificates_issued_total` (counter): certificates by kind
//! - `mgmt_server_state` (gauge): 0=stopped, 1=starting, 2=running, 3=stopping
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels for surface and status code only

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::state::ServerState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(surface: &str, status: u16, duration: Duration) {
    metrics::counter!(
        "mgmt_requests_total",
        "surface" => surface.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("mgmt_request_duration_seconds", "surface" => surface.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_handshake_failure() {
    metrics::counter!("mgmt_tls_handshake_failures_total").increment(1);
}

pub fn record_certificate_issued(kind: &'static str) {
    metrics::counter!("mgmt_certificates_issued_total", "kind" => kind).increment(1);
}

pub fn set_server_state(state: ServerState) {
    metrics::gauge!("mgmt_server_state").set(f64::from(state as u8));
}
