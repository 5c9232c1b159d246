//! Periodic health checking.
//!
//! # Responsibilities
//! - Recompute load and quality scores on a fixed interval
//! - Probe unhealthy backends, when a probe is configured
//!
//! The loop never holds the registry lock across a probe and never waits
//! on in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::health::probe::HealthProbe;
use crate::health::registry::BackendHealthRegistry;
use crate::lifecycle::ShutdownSignal;

pub struct HealthMonitor {
    registry: Arc<BackendHealthRegistry>,
    interval: Duration,
    probe: Option<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendHealthRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            probe: None,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>, timeout: Duration) -> Self {
        self.probe = Some(probe);
        self.probe_timeout = timeout;
        self
    }

    /// Tick until shutdown is signalled. A signal raised before the loop
    /// starts stops it before the first pass.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            probing = self.probe.is_some(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_all().await;
                }
            }
        }
    }

    /// One pass: recompute scores, then probe unhealthy backends.
    pub async fn check_all(&self) {
        self.registry.recompute_scores();

        let Some(probe) = &self.probe else {
            return;
        };

        for id in self.registry.unhealthy_ids() {
            if !probe.has_target(&id) {
                continue;
            }
            let healthy = match time::timeout(self.probe_timeout, probe.probe(&id)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(backend = %id, "Health probe failed: timeout");
                    false
                }
            };
            self.registry.record_probe(&id, healthy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::registry::HealthSettings;
    use crate::lifecycle::Shutdown;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysUp {
        calls: AtomicUsize,
    }

    impl HealthProbe for AlwaysUp {
        fn has_target(&self, backend_id: &str) -> bool {
            backend_id != "unprobed"
        }

        fn probe<'a>(&'a self, _backend_id: &'a str) -> BoxFuture<'a, bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { true })
        }
    }

    fn failing_registry() -> Arc<BackendHealthRegistry> {
        let reg = Arc::new(BackendHealthRegistry::new(HealthSettings::default()));
        for id in ["a", "unprobed"] {
            reg.register(id, 1.0).unwrap();
            for _ in 0..3 {
                reg.record_outcome(id, Duration::from_millis(5), false);
            }
        }
        reg.register("b", 1.0).unwrap();
        reg
    }

    #[tokio::test]
    async fn test_probes_only_unhealthy_targets() {
        let reg = failing_registry();
        let probe = Arc::new(AlwaysUp { calls: AtomicUsize::new(0) });
        let monitor = HealthMonitor::new(reg.clone(), Duration::from_millis(10))
            .with_probe(probe.clone(), Duration::from_millis(100));

        monitor.check_all().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(!reg.get("a").unwrap().healthy);

        monitor.check_all().await;
        assert!(reg.get("a").unwrap().healthy);
        assert!(!reg.get("unprobed").unwrap().healthy);
        assert_eq!(reg.get("a").unwrap().quality_score, 0.0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let reg = failing_registry();
        let shutdown = Shutdown::new();
        let monitor = HealthMonitor::new(reg.clone(), Duration::from_millis(5));
        let handle = tokio::spawn(monitor.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(reg.get("a").unwrap().quality_score, 0.0);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
