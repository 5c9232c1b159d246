//! Scaling rule engine.
//!
//! Polls balancer statistics on its own cadence and turns matching rules
//! into [`ScalingDecision`]s for a caller-supplied sink. The engine never
//! touches the health registry; [`LoadBalancerStats`] is its only input.
//!
//! ```text
//! every interval:
//!     stats = source.stats()
//!     for rule in rules (in order):
//!         if rule.condition matches and rule is out of cooldown:
//!             emit ScalingDecision, start cooldown
//! ```

pub mod rules;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::{LoadBalancer, LoadBalancerStats};
use crate::observability::metrics;

pub use rules::{ScalingAction, ScalingCondition, ScalingRule};

/// Anything that can report balancer statistics.
pub trait StatsSource: Send + Sync {
    fn stats(&self) -> LoadBalancerStats;
}

impl StatsSource for LoadBalancer {
    fn stats(&self) -> LoadBalancerStats {
        self.get_stats()
    }
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    pub rule: String,
    pub action: ScalingAction,
    pub condition: ScalingCondition,
}

pub struct ScalingRuleEngine {
    rules: Vec<ScalingRule>,
    /// When each rule last fired, for cooldown tracking.
    last_fired: HashMap<String, Instant>,
}

impl ScalingRuleEngine {
    pub fn new(rules: Vec<ScalingRule>) -> Self {
        Self {
            rules,
            last_fired: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &[ScalingRule] {
        &self.rules
    }

    fn cooling_down(&self, rule: &ScalingRule, now: Instant) -> bool {
        self.last_fired
            .get(&rule.name)
            .is_some_and(|fired| now.saturating_duration_since(*fired) < rule.cooldown())
    }

    /// Decisions for `stats`, in rule order.
    pub fn evaluate(&mut self, stats: &LoadBalancerStats, now: Instant) -> Vec<ScalingDecision> {
        let mut decisions = Vec::new();

        for rule in &self.rules {
            if !rule.condition.matches(stats) {
                continue;
            }
            if self.cooling_down(rule, now) {
                tracing::debug!(rule = %rule.name, "Scaling rule matched during cooldown, suppressed");
                continue;
            }

            tracing::info!(
                rule = %rule.name,
                action = %rule.action,
                success_rate = stats.overall_success_rate,
                healthy = stats.healthy_backend_count,
                total = stats.total_backend_count,
                "Scaling rule fired"
            );
            metrics::record_scaling_decision(&rule.name, rule.action.as_str());
            decisions.push(ScalingDecision {
                rule: rule.name.clone(),
                action: rule.action,
                condition: rule.condition.clone(),
            });
        }

        for decision in &decisions {
            self.last_fired.insert(decision.rule.clone(), now);
        }
        decisions
    }

    /// Poll `source` every `interval` until shutdown, handing each decision to `sink`.
    pub async fn run<S, F>(
        mut self,
        source: Arc<S>,
        interval: Duration,
        mut shutdown: ShutdownSignal,
        mut sink: F,
    ) where
        S: StatsSource + ?Sized,
        F: FnMut(ScalingDecision) + Send,
    {
        tracing::info!(
            rules = self.rules.len(),
            interval_ms = interval.as_millis() as u64,
            "Scaling engine starting"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Scaling engine received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = source.stats();
                    for decision in self.evaluate(&stats, Instant::now()) {
                        sink(decision);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::BackendHealthRegistry;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::{Algorithm, BalancerOptions};
    use std::sync::Mutex;

    fn empty_stats() -> LoadBalancerStats {
        LoadBalancerStats::aggregate(Algorithm::RoundRobin, std::iter::empty())
    }

    fn outage_stats() -> LoadBalancerStats {
        let lb = LoadBalancer::new(Arc::new(BackendHealthRegistry::default()), BalancerOptions::default());
        lb.register_backend("a", 1.0).unwrap();
        for _ in 0..3 {
            lb.registry().record_outcome("a", Duration::from_millis(5), false);
        }
        lb.get_stats()
    }

    fn engine() -> ScalingRuleEngine {
        ScalingRuleEngine::new(vec![
            ScalingRule::new("outage", ScalingCondition::NoHealthyBackends, ScalingAction::Failover)
                .with_cooldown(Duration::from_secs(60)),
            ScalingRule::new(
                "low-success",
                ScalingCondition::SuccessRateBelow(0.5),
                ScalingAction::ScaleUp(2),
            ),
        ])
    }

    #[tokio::test]
    async fn test_fires_in_rule_order() {
        let mut engine = engine();
        let decisions = engine.evaluate(&outage_stats(), Instant::now());
        let fired: Vec<_> = decisions.iter().map(|d| (d.rule.as_str(), d.action)).collect();
        assert_eq!(
            fired,
            vec![("outage", ScalingAction::Failover), ("low-success", ScalingAction::ScaleUp(2))]
        );
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_refire() {
        let mut engine = engine();
        let stats = outage_stats();
        let start = Instant::now();
        engine.evaluate(&stats, start);

        let again = engine.evaluate(&stats, start + Duration::from_secs(30));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].rule, "low-success");

        let later = engine.evaluate(&stats, start + Duration::from_secs(60));
        assert_eq!(later.len(), 2);
    }

    #[tokio::test]
    async fn test_quiet_when_nothing_matches() {
        let mut engine = engine();
        assert!(engine.evaluate(&empty_stats(), Instant::now()).is_empty());
    }

    struct Fixed(LoadBalancerStats);

    impl StatsSource for Fixed {
        fn stats(&self) -> LoadBalancerStats {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_run_polls_until_shutdown() {
        let shutdown = Shutdown::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let handle = tokio::spawn(engine().run(
            Arc::new(Fixed(outage_stats())),
            Duration::from_millis(5),
            shutdown.subscribe(),
            move |d: ScalingDecision| sink_seen.lock().unwrap().push(d.rule),
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().filter(|r| *r == "outage").count(), 1);
        assert!(seen.iter().filter(|r| *r == "low-success").count() > 1);
    }
}
