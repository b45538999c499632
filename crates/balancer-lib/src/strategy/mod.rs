//! Worker selection strategies
//!
//! Every strategy is a unit type implementing [`Selector`]. A selector sees a
//! read-only view of the tracked worker state plus the rotation cursors it
//! owns, and returns the index of the chosen candidate. Callers resolve the
//! zero- and one-candidate cases before dispatching, so selectors may assume
//! at least two candidates.
//!
//! Reductions over candidates keep the first candidate on exact ties.

mod educational;
mod load;
mod rotation;


pub use educational::{Adaptive, EducationalOptimized};
pub use load::{LeastConnections, LeastResponseTime, QualityAware, ResourceAware};
pub use rotation::{RoundRobin, WeightedRoundRobin};

use crate::config::{LoadBalancingConfig, Strategy};
use crate::metrics::ResourceMetrics;
use crate::models::Task;
use crate::worker::WorkerResourceState;
use std::collections::HashMap;

/// Lowest and highest weighted-round-robin weight
pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 10;

/// A worker offered for selection
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub current_tasks: Option<u32>,
    pub specializations: &'a [String],
}

/// Rotation positions that persist across selections
#[derive(Debug, Clone, Default)]
pub struct SelectionCursors {
    pub round_robin: usize,
    pub weighted: usize,
}

/// State a selector may consult
pub struct SelectionContext<'a> {
    pub config: &'a LoadBalancingConfig,
    pub worker_states: &'a HashMap<String, WorkerResourceState>,
    pub weights: &'a HashMap<String, u32>,
    pub system_metrics: Option<&'a ResourceMetrics>,
    pub grade_level_distribution: &'a HashMap<u32, u64>,
    pub cursors: &'a mut SelectionCursors,
}

impl SelectionContext<'_> {
    pub(crate) fn state(&self, worker_id: &str) -> Option<&WorkerResourceState> {
        self.worker_states.get(worker_id)
    }

    pub(crate) fn weight(&self, worker_id: &str) -> u32 {
        self.weights
            .get(worker_id)
            .copied()
            .unwrap_or(MIN_WEIGHT)
            .clamp(MIN_WEIGHT, MAX_WEIGHT)
    }
}

/// Common contract for selection policies
pub trait Selector: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Pick one of `candidates` (at least two) and return its index
    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        task: Option<&Task>,
    ) -> usize;
}

impl Strategy {
    /// The selector implementing this strategy
    pub fn selector(&self) -> &'static dyn Selector {
        match self {
            Strategy::RoundRobin => &RoundRobin,
            Strategy::WeightedRoundRobin => &WeightedRoundRobin,
            Strategy::LeastConnections => &LeastConnections,
            Strategy::LeastResponseTime => &LeastResponseTime,
            Strategy::ResourceAware => &ResourceAware,
            Strategy::QualityAware => &QualityAware,
            Strategy::EducationalOptimized => &EducationalOptimized,
            Strategy::Adaptive => &Adaptive,
        }
    }
}

/// Index of the first candidate whose score is strictly below `threshold`
/// and every earlier winner; `default` when none qualifies
fn first_min<'a, F>(candidates: &[Candidate<'a>], threshold: f64, default: usize, mut score: F) -> usize
where
    F: FnMut(&Candidate<'a>) -> Option<f64>,
{
    let mut best = default;
    let mut best_score = threshold;
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(value) = score(candidate) {
            if value < best_score {
                best = index;
                best_score = value;
            }
        }
    }
    best
}

/// Mirror of [`first_min`] for maximization
fn first_max<'a, F>(candidates: &[Candidate<'a>], threshold: f64, default: usize, mut score: F) -> usize
where
    F: FnMut(&Candidate<'a>) -> Option<f64>,
{
    let mut best = default;
    let mut best_score = threshold;
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(value) = score(candidate) {
            if value > best_score {
                best = index;
                best_score = value;
            }
        }
    }
    best
}
