//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! select_backend(context)
//!     → registry snapshot (health/registry.rs)
//!     → keep healthy backends whose circuit admits requests
//!     → SelectionStrategy picks one:
//!         - round_robin.rs (rotate through eligible backends)
//!         - weighted.rs (weighted random draw, load/quality adjusted)
//!         - least_conn.rs (fewest in-flight requests)
//!         - quality.rs (highest composite quality score)
//!     → backend id, or NoHealthyBackend
//!
//! execute_request(id, operation)
//!     → connection guard → circuit breaker → outcome → registry
//! ```
//!
//! # Design Decisions
//! - Strategies are pure over their inputs; only round-robin keeps a counter
//! - The eligible set is recomputed on every selection, never cached
//! - The algorithm is chosen once, at construction

pub mod backend;
pub mod balancer;
pub mod least_conn;
pub mod quality;
pub mod round_robin;
pub mod stats;
pub mod weighted;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SelectionError;
use self::backend::Backend;

pub use balancer::{BalancerOptions, LoadBalancer};
pub use stats::{BackendStats, LoadBalancerStats};

/// Request priority hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Optional per-request hints. Consumed once by the strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionContext {
    pub priority: Priority,
    pub quality_critical: bool,
    pub cost_sensitive: bool,
}

impl SelectionContext {
    pub fn high_priority() -> Self {
        Self {
            priority: Priority::High,
            ..Self::default()
        }
    }

    pub fn quality_critical() -> Self {
        Self {
            quality_critical: true,
            ..Self::default()
        }
    }
}

/// Picks one backend out of the eligible set.
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// `eligible` is in registration order and already filtered.
    fn select<'a>(
        &self,
        eligible: &'a [Backend],
        context: &SelectionContext,
    ) -> Result<&'a Backend, SelectionError>;

    fn algorithm(&self) -> Algorithm;
}

/// The available strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    #[default]
    QualityWeighted,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::WeightedRoundRobin => "weighted_round_robin",
            Algorithm::LeastConnections => "least_connections",
            Algorithm::QualityWeighted => "quality_weighted",
        }
    }

    /// Instantiate the strategy.
    pub fn build(self) -> Box<dyn SelectionStrategy> {
        match self {
            Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            Algorithm::WeightedRoundRobin => Box::new(weighted::WeightedRoundRobin::new()),
            Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
            Algorithm::QualityWeighted => Box::new(quality::QualityWeighted::new()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First-encountered maximum of `score` over `backends`.
pub(crate) fn max_by_score<'a>(
    backends: &'a [Backend],
    score: impl Fn(&Backend) -> f64,
) -> Option<&'a Backend> {
    let mut best: Option<(&Backend, f64)> = None;
    for b in backends {
        let s = score(b);
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((b, s)),
        }
    }
    best.map(|(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_round_trips_through_name() {
        for algo in [
            Algorithm::RoundRobin,
            Algorithm::WeightedRoundRobin,
            Algorithm::LeastConnections,
            Algorithm::QualityWeighted,
        ] {
            assert_eq!(algo.build().algorithm(), algo);
            let json = serde_json::to_string(&algo).unwrap();
            assert_eq!(json, format!("\"{}\"", algo.as_str()));
        }
    }

    #[test]
    fn test_max_by_score_prefers_first_on_tie() {
        let backends = vec![
            Backend::new("a", 1.0),
            Backend::new("b", 1.0),
            Backend::new("c", 1.0),
        ];
        let best = max_by_score(&backends, |b| if b.id == "a" { 0.5 } else { 0.9 }).unwrap();
        assert_eq!(best.id, "b");
        assert!(max_by_score(&[], |_| 1.0).is_none());
    }
}
