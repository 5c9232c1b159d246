//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): executed requests by backend, outcome
//! - `balancer_request_duration_seconds` (histogram): latency per backend
//! - `balancer_active_connections` (gauge): in-flight requests per backend
//! - `balancer_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `balancer_backend_load_score` / `balancer_backend_quality_score` (gauges)
//! - `balancer_circuit_transitions_total` (counter): by backend, target state
//! - `balancer_circuit_rejections_total` (counter): fail-fast rejections
//! - `balancer_selections_total` (counter): by algorithm, outcome
//! - `balancer_scaling_decisions_total` (counter): by rule, action
//!
//! Recording is a no-op until a recorder is installed, so the library can
//! be used without ever calling [`init_metrics`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::load_balancer::Algorithm;
use crate::resilience::circuit_breaker::CircuitState;

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("balancer_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// How an executed request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
    Timeout,
    /// Refused by an open circuit; the backend was never called.
    Rejected,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::Failure => "failure",
            RequestOutcome::Timeout => "timeout",
            RequestOutcome::Rejected => "rejected",
        }
    }
}

pub fn record_request(backend: &str, outcome: RequestOutcome, latency: Duration) {
    counter!(
        "balancer_requests_total",
        "backend" => backend.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    if outcome != RequestOutcome::Rejected {
        histogram!("balancer_request_duration_seconds", "backend" => backend.to_string())
            .record(latency.as_secs_f64());
    }
}

pub fn record_active_connections(backend: &str, count: u64) {
    gauge!("balancer_active_connections", "backend" => backend.to_string()).set(count as f64);
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("balancer_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_backend_scores(backend: &str, load: f64, quality: f64) {
    gauge!("balancer_backend_load_score", "backend" => backend.to_string()).set(load);
    gauge!("balancer_backend_quality_score", "backend" => backend.to_string()).set(quality);
}

pub fn record_circuit_transition(backend: &str, to: CircuitState) {
    counter!(
        "balancer_circuit_transitions_total",
        "backend" => backend.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_circuit_rejection(backend: &str) {
    counter!("balancer_circuit_rejections_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_selection(algorithm: Algorithm, selected: bool) {
    counter!(
        "balancer_selections_total",
        "algorithm" => algorithm.as_str(),
        "outcome" => if selected { "selected" } else { "no_healthy_backend" }
    )
    .increment(1);
}

pub fn record_scaling_decision(rule: &str, action: &'static str) {
    counter!(
        "balancer_scaling_decisions_total",
        "rule" => rule.to_string(),
        "action" => action
    )
    .increment(1);
}
