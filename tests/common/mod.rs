//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_balancer::admin::{self, AppState};
use agent_balancer::error::RequestError;
use agent_balancer::health::{BackendHealthRegistry, HealthSettings};
use agent_balancer::lifecycle::Shutdown;
use agent_balancer::load_balancer::{Algorithm, BalancerOptions, LoadBalancer};
use agent_balancer::resilience::circuit_breaker::CircuitBreakerConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const RECOVERY_TIMEOUT: Duration = Duration::from_millis(100);
pub const CALL_TIMEOUT: Duration = Duration::from_millis(50);
pub const ADMIN_KEY: &str = "test-admin-key";

/// Default thresholds (health 3/2, breaker 5) with short timers.
pub fn fast_options(algorithm: Algorithm) -> BalancerOptions {
    BalancerOptions {
        algorithm,
        health_check_interval: Duration::from_millis(20),
        probe_timeout: Duration::from_millis(50),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: RECOVERY_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
        },
    }
}

/// A balancer with `ids` registered at weight 1.0, in order.
pub fn balancer_with(ids: &[&str], algorithm: Algorithm) -> LoadBalancer {
    let registry = Arc::new(BackendHealthRegistry::new(HealthSettings::default()));
    let lb = LoadBalancer::new(registry, fast_options(algorithm));
    for id in ids {
        lb.register_backend(id, 1.0).unwrap();
    }
    lb
}

pub async fn succeed(lb: &LoadBalancer, id: &str) -> Result<u32, RequestError<String>> {
    lb.execute_request(id, async { Ok(200) }).await
}

pub async fn fail(lb: &LoadBalancer, id: &str) -> Result<u32, RequestError<String>> {
    lb.execute_request(id, async { Err("backend error".to_string()) }).await
}

/// An operation that outlives [`CALL_TIMEOUT`].
pub async fn hang(lb: &LoadBalancer, id: &str) -> Result<u32, RequestError<String>> {
    lb.execute_request(id, async {
        tokio::time::sleep(CALL_TIMEOUT * 4).await;
        Ok(200)
    })
    .await
}

/// Serve the admin API on an ephemeral port.
pub async fn start_admin(lb: Arc<LoadBalancer>) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let state = AppState::new(lb, ADMIN_KEY);
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        admin::serve(listener, state, rx).await.unwrap();
    });
    (addr, shutdown, handle)
}
