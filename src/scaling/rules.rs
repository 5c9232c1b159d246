//! Scaling rules: a condition over balancer stats paired with an action.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::LoadBalancerStats;

/// A predicate over [`LoadBalancerStats`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingCondition {
    /// Overall success rate strictly below the threshold (0.0..=1.0).
    SuccessRateBelow(f64),
    /// Fewer healthy backends than the given count.
    HealthyBackendsBelow(usize),
    /// Backends are registered but none is eligible for selection.
    NoHealthyBackends,
    /// Mean load score strictly above the threshold.
    AverageLoadAbove(f64),
    /// Mean load score strictly below the threshold.
    AverageLoadBelow(f64),
    AverageLatencyAboveMs(f64),
}

impl ScalingCondition {
    pub fn matches(&self, stats: &LoadBalancerStats) -> bool {
        match *self {
            ScalingCondition::SuccessRateBelow(threshold) => stats.overall_success_rate < threshold,
            ScalingCondition::HealthyBackendsBelow(count) => stats.healthy_backend_count < count,
            ScalingCondition::NoHealthyBackends => {
                stats.total_backend_count > 0 && stats.eligible_backend_count == 0
            }
            ScalingCondition::AverageLoadAbove(threshold) => stats.average_load() > threshold,
            ScalingCondition::AverageLoadBelow(threshold) => {
                stats.total_backend_count > 0 && stats.average_load() < threshold
            }
            ScalingCondition::AverageLatencyAboveMs(threshold) => {
                stats.average_latency_ms() > threshold
            }
        }
    }

    /// Range check for configured thresholds.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            ScalingCondition::SuccessRateBelow(t)
            | ScalingCondition::AverageLoadAbove(t)
            | ScalingCondition::AverageLoadBelow(t) => {
                if (0.0..=1.0).contains(&t) {
                    Ok(())
                } else {
                    Err(format!("threshold must be within 0.0..=1.0, got {t}"))
                }
            }
            ScalingCondition::AverageLatencyAboveMs(t) => {
                if t.is_finite() && t > 0.0 {
                    Ok(())
                } else {
                    Err(format!("latency threshold must be positive, got {t}"))
                }
            }
            ScalingCondition::HealthyBackendsBelow(0) => {
                Err("healthy backend count must be at least 1".to_string())
            }
            ScalingCondition::HealthyBackendsBelow(_) | ScalingCondition::NoHealthyBackends => Ok(()),
        }
    }
}

/// What the scaling engine asks its sink to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp(u32),
    ScaleDown(u32),
    /// Route traffic to a standby pool.
    Failover,
}

impl ScalingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingAction::ScaleUp(_) => "scale_up",
            ScalingAction::ScaleDown(_) => "scale_down",
            ScalingAction::Failover => "failover",
        }
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::ScaleUp(n) | ScalingAction::ScaleDown(n) => {
                write!(f, "{}({n})", self.as_str())
            }
            ScalingAction::Failover => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScalingRule {
    pub name: String,
    pub condition: ScalingCondition,
    pub action: ScalingAction,
    /// Seconds a fired rule stays quiet.
    #[serde(default)]
    pub cooldown_secs: u64,
}

impl ScalingRule {
    pub fn new(name: impl Into<String>, condition: ScalingCondition, action: ScalingAction) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
            cooldown_secs: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}
