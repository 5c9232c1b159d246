//! Quality-weighted load balancing strategy.
//!
//! Scores each backend on a weighted blend of quality, idleness, latency,
//! and historical success, adjusted by request hints, and picks the best.
//!
//! ```text
//! score = 0.4 * quality
//!       + 0.3 * (1 - load)
//!       + 0.2 * 1 / max(1, avg_latency_ms)
//!       + 0.1 * (1 - failures / max(1, requests))
//!
//! priority = high    → score *= (2 - load)
//! quality_critical   → quality term uses quality²
//! cost_sensitive     → score /= max(1, weight)
//! ```

use crate::error::SelectionError;
use crate::load_balancer::{
    backend::Backend, max_by_score, Algorithm, Priority, SelectionContext, SelectionStrategy,
};

const QUALITY_WEIGHT: f64 = 0.4;
const IDLE_WEIGHT: f64 = 0.3;
const LATENCY_WEIGHT: f64 = 0.2;
const SUCCESS_WEIGHT: f64 = 0.1;

/// Composite score of `backend` under `context`.
pub fn score(backend: &Backend, context: &SelectionContext) -> f64 {
    let quality = if context.quality_critical {
        backend.quality_score * backend.quality_score
    } else {
        backend.quality_score
    };

    let mut score = QUALITY_WEIGHT * quality
        + IDLE_WEIGHT * (1.0 - backend.load_score)
        + LATENCY_WEIGHT * (1.0 / backend.average_response_time_ms.max(1.0))
        + SUCCESS_WEIGHT * (1.0 - backend.failure_ratio());

    if context.priority == Priority::High {
        score *= 2.0 - backend.load_score;
    }
    if context.cost_sensitive {
        score /= backend.weight.max(1.0);
    }
    score
}

/// Highest-score selector; ties go to the first backend.
#[derive(Debug, Default)]
pub struct QualityWeighted;

impl QualityWeighted {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for QualityWeighted {
    fn select<'a>(
        &self,
        eligible: &'a [Backend],
        context: &SelectionContext,
    ) -> Result<&'a Backend, SelectionError> {
        max_by_score(eligible, |b| score(b, context)).ok_or(SelectionError::NoEligibleBackend)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::QualityWeighted
    }
}
