//! Backend health registry.
//!
//! # Responsibilities
//! - Own the live metrics of every registered backend
//! - Classify backends healthy/unhealthy with hysteresis
//! - Hand out read-only snapshots for selection and stats
//!
//! # Locking
//! One read-write lock guards all entries. Outcome recording takes a short
//! write lock per call, so consecutive counters for a backend update in a
//! strict order even under concurrent completions. Snapshots take the read
//! lock, allowing concurrent selections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::BalancerError;
use crate::load_balancer::backend::{Backend, MAX_WEIGHT};
use crate::observability::metrics;

/// Thresholds for health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    /// Consecutive failures before a backend is marked unhealthy.
    pub failure_threshold: u32,
    /// Consecutive successes before an unhealthy backend is marked healthy.
    pub recovery_threshold: u32,
    /// Number of latency samples averaged per backend.
    pub latency_window: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
            latency_window: 100,
        }
    }
}

/// A change in a backend's health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameHealthy,
    BecameUnhealthy,
}

#[derive(Debug)]
struct Entry {
    backend: Backend,
    latencies: VecDeque<f64>,
    /// Distinguishes this registration from earlier ones under the same id.
    generation: u64,
}

impl Entry {
    fn matches(&self, id: &str, generation: Option<u64>) -> bool {
        self.backend.id == id && generation.map_or(true, |g| g == self.generation)
    }

    /// Apply one success/failure signal to the consecutive counters.
    fn apply_signal(&mut self, success: bool, settings: &HealthSettings) -> Option<HealthTransition> {
        let b = &mut self.backend;
        if success {
            b.consecutive_failures = 0;
            b.consecutive_successes = b.consecutive_successes.saturating_add(1);
            if !b.healthy && b.consecutive_successes >= settings.recovery_threshold {
                b.healthy = true;
                return Some(HealthTransition::BecameHealthy);
            }
        } else {
            b.consecutive_successes = 0;
            b.consecutive_failures = b.consecutive_failures.saturating_add(1);
            if b.healthy && b.consecutive_failures >= settings.failure_threshold {
                b.healthy = false;
                return Some(HealthTransition::BecameUnhealthy);
            }
        }
        None
    }

    fn push_latency(&mut self, latency_ms: f64, window: usize) {
        if self.latencies.len() >= window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
        self.backend.average_response_time_ms =
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64;
    }
}

/// Single source of truth for backend metrics and health.
#[derive(Debug, Default)]
pub struct BackendHealthRegistry {
    settings: HealthSettings,
    /// Registration order is preserved; strategies rely on it.
    entries: RwLock<Vec<Entry>>,
    next_generation: AtomicU64,
}

impl BackendHealthRegistry {
    pub fn new(settings: HealthSettings) -> Self {
        Self {
            settings,
            entries: RwLock::new(Vec::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a backend. All counters start at zero and the backend starts healthy.
    ///
    /// `weight` must lie in `(0, MAX_WEIGHT]`.
    pub fn register(&self, id: &str, weight: f64) -> Result<(), BalancerError> {
        if !weight.is_finite() || weight <= 0.0 || weight > MAX_WEIGHT {
            return Err(BalancerError::InvalidWeight {
                id: id.to_string(),
                weight,
            });
        }
        let mut entries = self.write();
        if entries.iter().any(|e| e.backend.id == id) {
            return Err(BalancerError::DuplicateBackend(id.to_string()));
        }
        entries.push(Entry {
            backend: Backend::new(id, weight),
            latencies: VecDeque::with_capacity(self.settings.latency_window),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        });
        drop(entries);

        metrics::record_backend_health(id, true);
        tracing::info!(backend = %id, weight, "Backend registered");
        Ok(())
    }

    /// Remove a backend and its metric history. Unknown ids are ignored.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.backend.id != id);
        let removed = entries.len() != before;
        drop(entries);

        if removed {
            tracing::info!(backend = %id, "Backend unregistered");
        }
        removed
    }

    /// Record the outcome of one completed request.
    ///
    /// Unknown ids are ignored; the backend may have been unregistered while
    /// the request was in flight.
    pub fn record_outcome(&self, id: &str, latency: Duration, success: bool) -> Option<HealthTransition> {
        self.record_outcome_for(id, None, latency, success)
    }

    fn record_outcome_for(
        &self,
        id: &str,
        generation: Option<u64>,
        latency: Duration,
        success: bool,
    ) -> Option<HealthTransition> {
        let window = self.settings.latency_window.max(1);
        let transition = {
            let mut entries = self.write();
            let entry = entries.iter_mut().find(|e| e.matches(id, generation))?;
            entry.backend.total_requests += 1;
            if !success {
                entry.backend.total_failures += 1;
            }
            entry.push_latency(latency.as_secs_f64() * 1000.0, window);
            entry.apply_signal(success, &self.settings)
        };

        if let Some(t) = transition {
            self.report_transition(id, t);
        }
        transition
    }

    /// Record an active probe result. Only the consecutive counters and the
    /// health flag move; request totals and latency are untouched.
    pub fn record_probe(&self, id: &str, success: bool) -> Option<HealthTransition> {
        let transition = {
            let mut entries = self.write();
            let entry = entries.iter_mut().find(|e| e.backend.id == id)?;
            entry.apply_signal(success, &self.settings)
        };

        if let Some(t) = transition {
            self.report_transition(id, t);
        }
        transition
    }

    fn report_transition(&self, id: &str, transition: HealthTransition) {
        match transition {
            HealthTransition::BecameUnhealthy => {
                tracing::warn!(
                    backend = %id,
                    threshold = self.settings.failure_threshold,
                    "Backend marked unhealthy"
                );
                metrics::record_backend_health(id, false);
            }
            HealthTransition::BecameHealthy => {
                tracing::info!(
                    backend = %id,
                    threshold = self.settings.recovery_threshold,
                    "Backend recovered"
                );
                metrics::record_backend_health(id, true);
            }
        }
    }

    /// Recompute load and quality scores for every backend. O(backends)
    /// under the write lock.
    pub fn recompute_scores(&self) {
        let mut entries = self.write();
        for entry in entries.iter_mut() {
            let b = &mut entry.backend;
            b.load_score = b.compute_load_score();
            b.quality_score = b.compute_quality_score();
        }
        let scores: Vec<(String, f64, f64)> = entries
            .iter()
            .map(|e| (e.backend.id.clone(), e.backend.load_score, e.backend.quality_score))
            .collect();
        drop(entries);

        for (id, load, quality) in scores {
            metrics::record_backend_scores(&id, load, quality);
        }
    }

    /// Copy of every backend, in registration order.
    pub fn snapshot(&self) -> Vec<Backend> {
        self.read().iter().map(|e| e.backend.clone()).collect()
    }

    /// Copy of one backend.
    pub fn get(&self, id: &str) -> Option<Backend> {
        self.read()
            .iter()
            .find(|e| e.backend.id == id)
            .map(|e| e.backend.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().iter().any(|e| e.backend.id == id)
    }

    /// Ids of currently unhealthy backends.
    pub fn unhealthy_ids(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|e| !e.backend.healthy)
            .map(|e| e.backend.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Count one in-flight request against `id`.
    ///
    /// The returned guard gives the connection back when dropped, so the
    /// count is restored on every exit path, including cancellation.
    pub fn acquire_connection(&self, id: &str) -> Option<ConnectionGuard<'_>> {
        let (current, generation) = {
            let mut entries = self.write();
            let entry = entries.iter_mut().find(|e| e.backend.id == id)?;
            entry.backend.current_connections += 1;
            (entry.backend.current_connections, entry.generation)
        };
        metrics::record_active_connections(id, current);
        Some(ConnectionGuard {
            registry: self,
            id: id.to_string(),
            generation,
        })
    }

    /// Give back a connection taken by `generation`. A backend removed and
    /// registered again since then is a different entry and is left alone.
    fn release_connection(&self, id: &str, generation: u64) {
        let current = {
            let mut entries = self.write();
            match entries.iter_mut().find(|e| e.matches(id, Some(generation))) {
                Some(entry) => {
                    entry.backend.current_connections =
                        entry.backend.current_connections.saturating_sub(1);
                    entry.backend.current_connections
                }
                None => return,
            }
        };
        metrics::record_active_connections(id, current);
    }
}

/// RAII guard over one in-flight request.
///
/// The guard is tied to the registration it was acquired from, not just the
/// backend id.
#[derive(Debug)]
pub struct ConnectionGuard<'a> {
    registry: &'a BackendHealthRegistry,
    id: String,
    generation: u64,
}

impl ConnectionGuard<'_> {
    pub fn backend_id(&self) -> &str {
        &self.id
    }

    /// Record this request's outcome. Ignored if the backend has been
    /// unregistered since the guard was acquired, even if the same id was
    /// registered again.
    pub fn record_outcome(&self, latency: Duration, success: bool) -> Option<HealthTransition> {
        self.registry
            .record_outcome_for(&self.id, Some(self.generation), latency, success)
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.registry.release_connection(&self.id, self.generation);
    }
}
