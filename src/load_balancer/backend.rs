//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single routable agent/worker instance
//! - Carry the live metrics strategies rank on
//! - Derive load and quality scores from those metrics
//!
//! A `Backend` value is always a copy taken from the health registry; it is
//! never mutated by selection code.

use serde::Serialize;

/// Connections at which the connection term of the load score saturates.
pub const LOAD_CONNECTION_CEILING: f64 = 10.0;
/// Average latency at which the latency term of the load score saturates.
pub const LOAD_LATENCY_CEILING_MS: f64 = 5000.0;
/// Largest accepted static weight.
pub const MAX_WEIGHT: f64 = 1_000_000.0;

/// A registered backend and its live metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub id: String,
    /// Static weight hint, set at registration.
    pub weight: f64,
    /// In-flight requests.
    pub current_connections: u64,
    pub total_requests: u64,
    pub total_failures: u64,
    /// Mean over the latency window.
    pub average_response_time_ms: f64,
    /// Derived burden in `[0, 1]`, refreshed by the health-check loop.
    pub load_score: f64,
    /// Derived reliability in `[0, 1]`, refreshed by the health-check loop.
    pub quality_score: f64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub healthy: bool,
}

impl Backend {
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            current_connections: 0,
            total_requests: 0,
            total_failures: 0,
            average_response_time_ms: 0.0,
            load_score: 0.0,
            quality_score: 1.0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            healthy: true,
        }
    }

    /// `0.5 * connections/10 + 0.5 * latency/5000`, each term capped at 1.
    pub fn compute_load_score(&self) -> f64 {
        let conns = (self.current_connections as f64 / LOAD_CONNECTION_CEILING).min(1.0);
        let latency = (self.average_response_time_ms / LOAD_LATENCY_CEILING_MS).min(1.0);
        (0.5 * conns + 0.5 * latency).clamp(0.0, 1.0)
    }

    /// Success ratio over the backend's lifetime; 1.0 before any request.
    pub fn compute_quality_score(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            1.0 - self.total_failures as f64 / self.total_requests as f64
        }
    }

    /// Failure ratio with the denominator floored at one request.
    pub fn failure_ratio(&self) -> f64 {
        self.total_failures as f64 / self.total_requests.max(1) as f64
    }
}
