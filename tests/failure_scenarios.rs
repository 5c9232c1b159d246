//! Failure isolation and recovery scenarios, driven through the public API.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agent_balancer::error::BalancerError;
use agent_balancer::health::HealthProbe;
use agent_balancer::load_balancer::{Algorithm, SelectionContext};
use agent_balancer::resilience::circuit_breaker::CircuitState;
use agent_balancer::scaling::{ScalingAction, ScalingCondition, ScalingRule, ScalingRuleEngine};
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

mod common;
use common::*;

#[tokio::test(start_paused = true)]
async fn test_cascading_failure_and_recovery() {
    let lb = balancer_with(&["a", "b", "c"], Algorithm::RoundRobin);
    let ctx = SelectionContext::default();

    for i in 1..=5 {
        let err = fail(&lb, "a").await.unwrap_err();
        assert_eq!(err.into_operation().as_deref(), Some("backend error"), "call {i}");
    }
    assert!(!lb.registry().get("a").unwrap().healthy);
    assert_eq!(lb.breaker("a").unwrap().state(), CircuitState::Open);
    assert!(succeed(&lb, "a").await.unwrap_err().is_circuit_open());

    for _ in 0..20 {
        assert_ne!(lb.select_backend(&ctx).unwrap(), "a");
    }

    tokio::time::sleep(RECOVERY_TIMEOUT + Duration::from_millis(20)).await;
    // The breaker would admit a probe, but health still excludes "a".
    assert!(lb.breaker("a").unwrap().allows_requests());
    assert!(!lb.is_eligible("a"));

    assert_eq!(succeed(&lb, "a").await.unwrap(), 200);
    assert_eq!(lb.breaker("a").unwrap().state(), CircuitState::Closed);
    assert!(!lb.is_eligible("a"), "one success is below the recovery threshold");

    succeed(&lb, "a").await.unwrap();
    assert!(lb.is_eligible("a"));

    let picks: HashSet<String> = (0..6).map(|_| lb.select_backend(&ctx).unwrap()).collect();
    assert!(picks.contains("a"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_reopens_circuit() {
    let lb = balancer_with(&["a", "b"], Algorithm::RoundRobin);
    for _ in 0..5 {
        let _ = fail(&lb, "a").await;
    }
    tokio::time::sleep(RECOVERY_TIMEOUT + Duration::from_millis(20)).await;

    assert!(fail(&lb, "a").await.unwrap_err().into_operation().is_some());
    let breaker = lb.breaker("a").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(succeed(&lb, "a").await.unwrap_err().is_circuit_open());
    assert!(breaker.snapshot().time_until_retry_ms.is_some());
}

struct Reachable;

impl HealthProbe for Reachable {
    fn has_target(&self, _backend_id: &str) -> bool {
        true
    }

    fn probe<'a>(&'a self, _backend_id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async { true })
    }
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_probes_unhealthy_backend_back() {
    let lb = balancer_with(&["a", "b"], Algorithm::RoundRobin);
    for _ in 0..3 {
        let _ = fail(&lb, "a").await;
    }
    assert!(!lb.is_eligible("a"));
    assert_eq!(lb.breaker("a").unwrap().state(), CircuitState::Closed);

    let handle = lb.spawn_health_checks(Some(Arc::new(Reachable)));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(lb.is_eligible("a"));

    let a = lb.registry().get("a").unwrap();
    assert_eq!(a.total_requests, 3, "probes are not requests");

    lb.stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_total_outage_reports_no_healthy_backend() {
    let lb = balancer_with(&["a", "b", "c"], Algorithm::QualityWeighted);
    for id in ["a", "b", "c"] {
        for _ in 0..3 {
            let _ = fail(&lb, id).await;
        }
    }

    assert_eq!(
        lb.select_backend(&SelectionContext::high_priority()),
        Err(BalancerError::NoHealthyBackend { registered: 3 })
    );

    let mut engine = ScalingRuleEngine::new(vec![ScalingRule::new(
        "outage",
        ScalingCondition::NoHealthyBackends,
        ScalingAction::Failover,
    )]);
    let decisions = engine.evaluate(&lb.get_stats(), tokio::time::Instant::now());
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].action, ScalingAction::Failover);
}

#[tokio::test]
async fn test_empty_balancer_reports_no_healthy_backend() {
    let lb = balancer_with(&[], Algorithm::LeastConnections);
    assert_eq!(
        lb.select_backend(&SelectionContext::default()),
        Err(BalancerError::NoHealthyBackend { registered: 0 })
    );
    assert_eq!(lb.get_stats().overall_success_rate, 1.0);
}

#[tokio::test]
async fn test_stats_success_rate() {
    let lb = balancer_with(&["a", "b"], Algorithm::RoundRobin);
    for _ in 0..4 {
        succeed(&lb, "a").await.unwrap();
    }
    for _ in 0..3 {
        succeed(&lb, "b").await.unwrap();
    }
    for _ in 0..3 {
        let _ = fail(&lb, "b").await;
    }

    let stats = lb.get_stats();
    assert_eq!(stats.total_requests, 10);
    assert_eq!(stats.total_failures, 3);
    assert!((stats.overall_success_rate - 0.7).abs() < 1e-9);
    assert_eq!(stats.healthy_backend_count, 1);
    assert_eq!(stats.total_backend_count, 2);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["totalRequests"], 10);
    assert_eq!(json["perBackend"]["b"]["metrics"]["totalFailures"], 3);
    assert_eq!(json["perBackend"]["b"]["breakerState"]["state"], "CLOSED");
}

#[tokio::test]
async fn test_connections_return_to_zero_on_every_path() {
    let lb = balancer_with(&["a"], Algorithm::LeastConnections);
    let connections = || lb.registry().get("a").unwrap().current_connections;

    succeed(&lb, "a").await.unwrap();
    assert_eq!(connections(), 0);

    let _ = fail(&lb, "a").await;
    assert_eq!(connections(), 0);

    assert!(hang(&lb, "a").await.unwrap_err().is_timeout());
    assert_eq!(connections(), 0);

    for _ in 0..5 {
        let _ = fail(&lb, "a").await;
    }
    assert!(succeed(&lb, "a").await.unwrap_err().is_circuit_open());
    assert_eq!(connections(), 0);

    // The last two failing calls hit the open circuit and never ran.
    let a = lb.registry().get("a").unwrap();
    assert_eq!(a.total_requests, 6);
    assert_eq!(a.total_failures, 5);
}

#[tokio::test]
async fn test_in_flight_requests_are_counted() {
    let lb = Arc::new(balancer_with(&["a"], Algorithm::LeastConnections));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let worker = {
        let lb = lb.clone();
        tokio::spawn(async move {
            lb.execute_request("a", async move {
                let _ = release_rx.await;
                Ok::<_, String>(())
            })
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(lb.registry().get("a").unwrap().current_connections, 1);

    release_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();
    assert_eq!(lb.registry().get("a").unwrap().current_connections, 0);
}

#[tokio::test]
async fn test_request_outliving_its_registration_is_not_counted() {
    let lb = Arc::new(balancer_with(&["a"], Algorithm::RoundRobin));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let worker = {
        let lb = lb.clone();
        tokio::spawn(async move {
            lb.execute_request("a", async move {
                let _ = release_rx.await;
                Err::<(), _>("backend error".to_string())
            })
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    lb.unregister_backend("a");
    lb.register_backend("a", 1.0).unwrap();
    release_tx.send(()).unwrap();
    assert!(worker.await.unwrap().is_err());

    let a = lb.registry().get("a").unwrap();
    assert_eq!(a.current_connections, 0);
    assert_eq!(a.total_requests, 0);
    assert_eq!(a.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_request_releases_connection_without_outcome() {
    let lb = balancer_with(&["a"], Algorithm::RoundRobin);
    let cancelled = tokio::time::timeout(Duration::from_millis(10), hang(&lb, "a")).await;
    assert!(cancelled.is_err());

    let a = lb.registry().get("a").unwrap();
    assert_eq!(a.current_connections, 0);
    assert_eq!(a.total_requests, 0);
}

#[tokio::test]
async fn test_unknown_backend_is_not_counted() {
    let lb = balancer_with(&["a"], Algorithm::RoundRobin);
    let err = succeed(&lb, "ghost").await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
    assert_eq!(lb.get_stats().total_requests, 0);
}

#[tokio::test]
async fn test_selected_backend_is_always_eligible() {
    let lb = balancer_with(&["a", "b", "c", "d"], Algorithm::WeightedRoundRobin);
    for _ in 0..5 {
        let _ = fail(&lb, "a").await;
    }
    for _ in 0..3 {
        let _ = fail(&lb, "b").await;
    }
    lb.registry().recompute_scores();

    for ctx in [
        SelectionContext::default(),
        SelectionContext::high_priority(),
        SelectionContext::quality_critical(),
    ] {
        for _ in 0..200 {
            let id = lb.select_backend(&ctx).unwrap();
            assert!(lb.is_eligible(&id), "{id} was selected while ineligible");
            assert!(id == "c" || id == "d");
        }
    }
}

#[tokio::test]
async fn test_unregistered_backend_is_never_selected() {
    let lb = balancer_with(&["a", "b"], Algorithm::RoundRobin);
    assert!(lb.unregister_backend("a"));
    for _ in 0..5 {
        assert_eq!(lb.select_backend(&SelectionContext::default()).unwrap(), "b");
    }
    assert!(succeed(&lb, "a").await.is_err());
    assert!(!lb.get_stats().per_backend.contains_key("a"));
}
