//! The load balancer façade.
//!
//! # Responsibilities
//! - Register/unregister backends together with their circuit breakers
//! - Select a backend from the eligible set via the configured strategy
//! - Execute work through a backend's breaker and account the outcome
//! - Report aggregate statistics
//! - Run the periodic health-check loop until stopped
//!
//! # Locking
//! The registry lock and a breaker's lock are never held at the same time.
//! Breakers are cloned out of the map before they are consulted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{BalancerError, RequestError};
use crate::health::monitor::HealthMonitor;
use crate::health::probe::HealthProbe;
use crate::health::registry::BackendHealthRegistry;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{
    backend::Backend, stats::LoadBalancerStats, Algorithm, SelectionContext, SelectionStrategy,
};
use crate::observability::metrics::{self, RequestOutcome};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Construction-time balancer options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancerOptions {
    pub algorithm: Algorithm,
    pub health_check_interval: Duration,
    /// Deadline for a single active health probe.
    pub probe_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for BalancerOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Routes requests across registered backends.
#[derive(Debug)]
pub struct LoadBalancer {
    registry: Arc<BackendHealthRegistry>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    strategy: Box<dyn SelectionStrategy>,
    options: BalancerOptions,
    shutdown: Shutdown,
}

impl LoadBalancer {
    /// Create a balancer over an injected registry.
    ///
    /// Backends already present in `registry` get a fresh closed breaker.
    pub fn new(registry: Arc<BackendHealthRegistry>, options: BalancerOptions) -> Self {
        let breakers = DashMap::new();
        for backend in registry.snapshot() {
            breakers.insert(
                backend.id.clone(),
                Arc::new(CircuitBreaker::new(backend.id, options.circuit_breaker)),
            );
        }
        Self {
            registry,
            breakers,
            strategy: options.algorithm.build(),
            options,
            shutdown: Shutdown::new(),
        }
    }

    pub fn registry(&self) -> &Arc<BackendHealthRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &BalancerOptions {
        &self.options
    }

    pub fn algorithm(&self) -> Algorithm {
        self.strategy.algorithm()
    }

    /// Register a backend and create its circuit breaker.
    pub fn register_backend(&self, id: &str, weight: f64) -> Result<(), BalancerError> {
        self.registry.register(id, weight)?;
        self.breakers.insert(
            id.to_string(),
            Arc::new(CircuitBreaker::new(id, self.options.circuit_breaker)),
        );
        Ok(())
    }

    /// Remove a backend and its breaker. Unknown ids are a no-op.
    pub fn unregister_backend(&self, id: &str) -> bool {
        let removed = self.registry.unregister(id);
        self.breakers.remove(id);
        removed
    }

    /// The breaker guarding `id`.
    pub fn breaker(&self, id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn breaker_admits(&self, id: &str) -> bool {
        // A backend without a breaker is mid-registration or mid-removal.
        self.breaker(id).is_some_and(|b| b.allows_requests())
    }

    /// Backends that are healthy and whose circuit admits requests, in
    /// registration order. Recomputed on every call.
    ///
    /// An open circuit whose recovery timeout has elapsed admits a trial
    /// call, so its backend is listed here even though the breaker's
    /// `state()` still reports `Open` until that call is made.
    pub fn eligible_backends(&self) -> Vec<Backend> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|b| b.healthy && self.breaker_admits(&b.id))
            .collect()
    }

    /// Whether `id` is healthy and its circuit admits requests.
    ///
    /// Like [`eligible_backends`](Self::eligible_backends), this treats an
    /// open circuit past its recovery timeout as admitting, although
    /// `state()` still reports `Open`.
    pub fn is_eligible(&self, id: &str) -> bool {
        self.registry.get(id).is_some_and(|b| b.healthy) && self.breaker_admits(id)
    }

    /// Pick a backend for the next request.
    ///
    /// Fails with [`BalancerError::NoHealthyBackend`] when nothing is
    /// eligible; callers use that to reject, queue, or trigger scaling.
    pub fn select_backend(&self, context: &SelectionContext) -> Result<String, BalancerError> {
        let eligible = self.eligible_backends();
        let algorithm = self.strategy.algorithm();

        match self.strategy.select(&eligible, context) {
            Ok(backend) => {
                metrics::record_selection(algorithm, true);
                tracing::trace!(backend = %backend.id, %algorithm, eligible = eligible.len(), "Backend selected");
                Ok(backend.id.clone())
            }
            Err(_) => {
                let registered = self.registry.len();
                metrics::record_selection(algorithm, false);
                tracing::warn!(registered, %algorithm, "No healthy backend available");
                Err(BalancerError::NoHealthyBackend { registered })
            }
        }
    }

    /// Run `operation` against `backend_id` through its circuit breaker.
    ///
    /// The in-flight count is raised for the duration of the call and the
    /// outcome is recorded exactly once before the result is returned.
    /// Calls rejected by an open circuit never reach the backend and are
    /// not recorded as outcomes. Errors from `operation` come back unchanged
    /// in [`RequestError::Operation`]. Nothing is retried.
    pub async fn execute_request<Fut, T, E>(
        &self,
        backend_id: &str,
        operation: Fut,
    ) -> Result<T, RequestError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let unknown = || RequestError::UnknownBackend(backend_id.to_string());
        let breaker = self.breaker(backend_id).ok_or_else(unknown)?;
        let connection = self.registry.acquire_connection(backend_id).ok_or_else(unknown)?;

        let started = Instant::now();
        let result = breaker.call(operation).await;
        let latency = started.elapsed();

        let outcome = match &result {
            Ok(_) => RequestOutcome::Success,
            Err(RequestError::CircuitOpen { .. }) => RequestOutcome::Rejected,
            Err(RequestError::Timeout { .. }) => RequestOutcome::Timeout,
            Err(_) => RequestOutcome::Failure,
        };
        if outcome != RequestOutcome::Rejected {
            connection.record_outcome(latency, outcome == RequestOutcome::Success);
        }
        metrics::record_request(backend_id, outcome, latency);
        drop(connection);

        result
    }

    /// Aggregate report for the scaling engine.
    pub fn get_stats(&self) -> LoadBalancerStats {
        let entries = self.registry.snapshot().into_iter().filter_map(|backend| {
            let breaker = self.breaker(&backend.id)?;
            Some((backend, breaker.snapshot(), breaker.allows_requests()))
        });
        LoadBalancerStats::aggregate(self.strategy.algorithm(), entries)
    }

    /// Start the periodic health-check loop. It runs until [`stop`](Self::stop).
    pub fn spawn_health_checks(&self, probe: Option<Arc<dyn HealthProbe>>) -> JoinHandle<()> {
        let mut monitor =
            HealthMonitor::new(self.registry.clone(), self.options.health_check_interval);
        if let Some(probe) = probe {
            monitor = monitor.with_probe(probe, self.options.probe_timeout);
        }
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(monitor.run(shutdown))
    }

    /// Stop background loops started by this balancer.
    pub fn stop(&self) {
        tracing::info!(listeners = self.shutdown.receiver_count(), "Stopping load balancer");
        // Latched: loops spawned after this call exit immediately.
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::registry::HealthSettings;

    fn balancer(algorithm: Algorithm) -> LoadBalancer {
        let options = BalancerOptions {
            algorithm,
            health_check_interval: Duration::from_millis(10),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_millis(50),
                call_timeout: Duration::from_millis(100),
            },
            ..BalancerOptions::default()
        };
        let lb = LoadBalancer::new(
            Arc::new(BackendHealthRegistry::new(HealthSettings::default())),
            options,
        );
        for id in ["a", "b", "c"] {
            lb.register_backend(id, 1.0).unwrap();
        }
        lb
    }

    async fn fail_on(lb: &LoadBalancer, id: &str) -> RequestError<&'static str> {
        lb.execute_request(id, async { Err::<(), _>("boom") })
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_register_creates_breaker() {
        let lb = balancer(Algorithm::RoundRobin);
        assert!(lb.breaker("a").is_some());
        assert_eq!(
            lb.register_backend("a", 1.0),
            Err(BalancerError::DuplicateBackend("a".into()))
        );
        assert!(lb.unregister_backend("a"));
        assert!(lb.breaker("a").is_none());
        assert!(!lb.unregister_backend("a"));
    }

    #[tokio::test]
    async fn test_new_adopts_existing_registry_entries() {
        let registry = Arc::new(BackendHealthRegistry::default());
        registry.register("pre", 1.0).unwrap();
        let lb = LoadBalancer::new(registry, BalancerOptions::default());
        assert!(lb.breaker("pre").is_some());
        assert_eq!(lb.select_backend(&SelectionContext::default()).unwrap(), "pre");
    }

    #[tokio::test]
    async fn test_round_robin_cycles_registration_order() {
        let lb = balancer(Algorithm::RoundRobin);
        let ctx = SelectionContext::default();
        let picks: Vec<_> = (0..6).map(|_| lb.select_backend(&ctx).unwrap()).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_execute_records_outcomes() {
        let lb = balancer(Algorithm::RoundRobin);
        let value = lb.execute_request("a", async { Ok::<_, &str>(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(fail_on(&lb, "a").await.into_operation(), Some("boom"));

        let a = lb.registry().get("a").unwrap();
        assert_eq!(a.total_requests, 2);
        assert_eq!(a.total_failures, 1);
        assert_eq!(a.current_connections, 0);
    }

    #[tokio::test]
    async fn test_execute_unknown_backend() {
        let lb = balancer(Algorithm::RoundRobin);
        let err = lb
            .execute_request("ghost", async { Ok::<_, &str>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::UnknownBackend(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_not_selected() {
        let lb = balancer(Algorithm::RoundRobin);
        for _ in 0..3 {
            fail_on(&lb, "b").await;
        }
        assert!(!lb.is_eligible("b"));
        let ctx = SelectionContext::default();
        for _ in 0..10 {
            assert_ne!(lb.select_backend(&ctx).unwrap(), "b");
        }
    }

    #[tokio::test]
    async fn test_rejected_calls_are_not_outcomes() {
        let lb = balancer(Algorithm::RoundRobin);
        for _ in 0..5 {
            fail_on(&lb, "a").await;
        }
        assert!(fail_on(&lb, "a").await.is_circuit_open());
        let a = lb.registry().get("a").unwrap();
        assert_eq!(a.total_requests, 5);
        assert_eq!(a.current_connections, 0);
    }

    #[tokio::test]
    async fn test_no_healthy_backend() {
        let lb = balancer(Algorithm::LeastConnections);
        for id in ["a", "b", "c"] {
            for _ in 0..3 {
                fail_on(&lb, id).await;
            }
        }
        assert_eq!(
            lb.select_backend(&SelectionContext::default()),
            Err(BalancerError::NoHealthyBackend { registered: 3 })
        );
    }

    #[tokio::test]
    async fn test_health_loop_recomputes_until_stopped() {
        let lb = balancer(Algorithm::QualityWeighted);
        fail_on(&lb, "a").await;
        let handle = lb.spawn_health_checks(None);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(lb.registry().get("a").unwrap().quality_score, 0.0);

        lb.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_spawn_is_not_lost() {
        let lb = balancer(Algorithm::QualityWeighted);
        fail_on(&lb, "a").await;
        lb.stop();

        let handle = lb.spawn_health_checks(None);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        // The loop exited before its first pass.
        assert_eq!(lb.registry().get("a").unwrap().quality_score, 1.0);
    }
}
