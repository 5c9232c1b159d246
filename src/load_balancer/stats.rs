//! Aggregate balancer statistics.
//!
//! This is the only view the external scaling engine gets of the balancer.
//! It serializes to JSON with camelCase field names.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::load_balancer::{backend::Backend, Algorithm};
use crate::resilience::circuit_breaker::BreakerSnapshot;

/// Routing status of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    /// Healthy and its circuit admits requests.
    Available,
    /// Marked unhealthy by the registry.
    Unhealthy,
    /// Healthy, but its circuit is open.
    CircuitOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub state: BackendStatus,
    pub metrics: Backend,
    pub breaker_state: BreakerSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStats {
    pub algorithm: Algorithm,
    pub total_requests: u64,
    pub total_failures: u64,
    /// `(requests - failures) / requests`; 1.0 before any request.
    pub overall_success_rate: f64,
    pub healthy_backend_count: usize,
    pub eligible_backend_count: usize,
    pub total_backend_count: usize,
    pub per_backend: BTreeMap<String, BackendStats>,
}

impl LoadBalancerStats {
    /// Aggregate per-backend entries. `entries` pairs each backend with its
    /// breaker snapshot and whether the breaker currently admits requests.
    pub fn aggregate(
        algorithm: Algorithm,
        entries: impl IntoIterator<Item = (Backend, BreakerSnapshot, bool)>,
    ) -> Self {
        let mut stats = Self {
            algorithm,
            total_requests: 0,
            total_failures: 0,
            overall_success_rate: 1.0,
            healthy_backend_count: 0,
            eligible_backend_count: 0,
            total_backend_count: 0,
            per_backend: BTreeMap::new(),
        };

        for (backend, breaker_state, admits) in entries {
            stats.total_requests += backend.total_requests;
            stats.total_failures += backend.total_failures;
            stats.total_backend_count += 1;

            let state = if !backend.healthy {
                BackendStatus::Unhealthy
            } else if !admits {
                BackendStatus::CircuitOpen
            } else {
                BackendStatus::Available
            };
            if backend.healthy {
                stats.healthy_backend_count += 1;
            }
            if state == BackendStatus::Available {
                stats.eligible_backend_count += 1;
            }

            stats.per_backend.insert(
                backend.id.clone(),
                BackendStats {
                    state,
                    metrics: backend,
                    breaker_state,
                },
            );
        }

        if stats.total_requests > 0 {
            stats.overall_success_rate = (stats.total_requests - stats.total_failures) as f64
                / stats.total_requests as f64;
        }
        stats
    }

    /// Mean load score over all backends; 0.0 with no backends.
    pub fn average_load(&self) -> f64 {
        self.mean_of(|b| b.metrics.load_score)
    }

    /// Mean of per-backend average latencies; 0.0 with no backends.
    pub fn average_latency_ms(&self) -> f64 {
        self.mean_of(|b| b.metrics.average_response_time_ms)
    }

    fn mean_of(&self, f: impl Fn(&BackendStats) -> f64) -> f64 {
        if self.per_backend.is_empty() {
            return 0.0;
        }
        self.per_backend.values().map(f).sum::<f64>() / self.per_backend.len() as f64
    }
}
