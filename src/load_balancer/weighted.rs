//! Weighted load balancing strategy.
//!
//! Each backend's static weight is scaled by how idle and how reliable it
//! currently is, then one backend is drawn at random proportionally.

use rand::Rng;

use crate::error::SelectionError;
use crate::load_balancer::{backend::Backend, Algorithm, SelectionContext, SelectionStrategy};

/// Lowest effective weight a backend can have; keeps every eligible
/// backend drawable.
pub const MIN_EFFECTIVE_WEIGHT: f64 = 0.1;

/// `weight * (2 - load) * quality`, floored at [`MIN_EFFECTIVE_WEIGHT`].
pub fn effective_weight(backend: &Backend) -> f64 {
    let w = backend.weight * (2.0 - backend.load_score) * backend.quality_score;
    if w.is_finite() {
        w.max(MIN_EFFECTIVE_WEIGHT)
    } else {
        MIN_EFFECTIVE_WEIGHT
    }
}

/// Walk the cumulative weights and return the backend `draw` lands on.
///
/// `draw` is expected in `[0, total)`; anything past the end falls on the
/// last backend.
pub fn pick_by_draw(eligible: &[Backend], draw: f64) -> Option<&Backend> {
    let weights: Vec<f64> = eligible.iter().map(effective_weight).collect();
    pick_index(&weights, draw).map(|i| &eligible[i])
}

fn pick_index(weights: &[f64], draw: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if draw < cumulative {
            return Some(i);
        }
    }
    weights.len().checked_sub(1)
}

/// Effective weights for `eligible`, with a finite sum.
///
/// Each weight is finite, but their sum can still overflow; in that case
/// every weight is divided by the largest one, which keeps the proportions.
fn draw_weights(eligible: &[Backend]) -> (Vec<f64>, f64) {
    let mut weights: Vec<f64> = eligible.iter().map(effective_weight).collect();
    let mut total: f64 = weights.iter().sum();
    if !total.is_finite() {
        let max = weights.iter().copied().fold(MIN_EFFECTIVE_WEIGHT, f64::max);
        for w in &mut weights {
            *w /= max;
        }
        total = weights.iter().sum();
    }
    (weights, total)
}

/// Weighted random selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for WeightedRoundRobin {
    fn select<'a>(
        &self,
        eligible: &'a [Backend],
        _context: &SelectionContext,
    ) -> Result<&'a Backend, SelectionError> {
        if eligible.is_empty() {
            return Err(SelectionError::NoEligibleBackend);
        }
        let (weights, total) = draw_weights(eligible);
        let draw = rand::thread_rng().gen_range(0.0..total);
        pick_index(&weights, draw)
            .map(|i| &eligible[i])
            .ok_or(SelectionError::NoEligibleBackend)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::WeightedRoundRobin
    }
}
