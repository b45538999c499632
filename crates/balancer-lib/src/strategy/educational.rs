//! Educational-context scoring and adaptive dispatch

use super::{Candidate, QualityAware, ResourceAware, SelectionContext, Selector, WeightedRoundRobin};
use crate::config::Strategy;
use crate::models::Task;
use tracing::debug;

/// Bonus for a worker specialized in the task's subject
pub const SUBJECT_BONUS: f64 = 0.3;

/// Bonus for a grade level that is under-served so far
pub const GRADE_BALANCE_BONUS: f64 = 0.1;

/// System utilization above which adaptive selection favours spare capacity
const ADAPTIVE_UTILIZATION_LIMIT: f64 = 0.8;

/// System error rate above which adaptive selection favours quality
const ADAPTIVE_ERROR_LIMIT: f64 = 0.1;

/// Weighted blend of quality, spare capacity and specialization, with
/// bonuses for subject match and grade-level balance
pub struct EducationalOptimized;

impl EducationalOptimized {
    pub(crate) fn grade_is_underserved(ctx: &SelectionContext<'_>, grade: u32) -> bool {
        let distribution = ctx.grade_level_distribution;
        if distribution.is_empty() {
            return false;
        }
        let mean = distribution.values().sum::<u64>() as f64 / distribution.len() as f64;
        let count = distribution.get(&grade).copied().unwrap_or(0) as f64;
        count < mean
    }

    fn score(ctx: &SelectionContext<'_>, candidate: &Candidate<'_>, task: &Task) -> Option<f64> {
        let state = ctx.state(candidate.id)?;
        let config = ctx.config;

        let mut score = state.predicted_quality_score * config.quality_weight
            + (1.0 - state.load_factor) * config.performance_weight
            + state.educational_specialization_score * config.educational_weight;

        if config.subject_specialization_bonus {
            if let Some(subject) = task.subject() {
                let declared = if candidate.specializations.is_empty() {
                    state.educational_specializations.as_slice()
                } else {
                    candidate.specializations
                };
                if declared.iter().any(|s| s == subject) {
                    score += SUBJECT_BONUS;
                }
            }
        }

        if config.grade_level_balancing {
            if let Some(grade) = task.grade_level() {
                if Self::grade_is_underserved(ctx, grade) {
                    score += GRADE_BALANCE_BONUS;
                }
            }
        }

        Some(score)
    }
}

impl Selector for EducationalOptimized {
    fn strategy(&self) -> Strategy {
        Strategy::EducationalOptimized
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        task: Option<&Task>,
    ) -> usize {
        let task = match task {
            Some(task) if task.has_educational_context() => task,
            _ => return ResourceAware.select(ctx, candidates, task),
        };

        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(score) = Self::score(ctx, candidate, task) {
                if score > best_score {
                    best = index;
                    best_score = score;
                }
            }
        }
        best
    }
}

/// Delegates to another strategy based on current system conditions
pub struct Adaptive;

impl Adaptive {
    /// The strategy the next selection would be delegated to
    pub fn delegate(ctx: &SelectionContext<'_>, task: Option<&Task>) -> Strategy {
        if let Some(system) = ctx.system_metrics {
            if system.overall_utilization() > ADAPTIVE_UTILIZATION_LIMIT {
                return Strategy::ResourceAware;
            }
            if system.error_rate > ADAPTIVE_ERROR_LIMIT {
                return Strategy::QualityAware;
            }
        }
        if task.is_some_and(Task::has_educational_context) {
            return Strategy::EducationalOptimized;
        }
        Strategy::WeightedRoundRobin
    }
}

impl Selector for Adaptive {
    fn strategy(&self) -> Strategy {
        Strategy::Adaptive
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        task: Option<&Task>,
    ) -> usize {
        let delegate = Self::delegate(ctx, task);
        debug!(delegate = %delegate, "Adaptive selection");
        match delegate {
            Strategy::ResourceAware => ResourceAware.select(ctx, candidates, task),
            Strategy::QualityAware => QualityAware.select(ctx, candidates, task),
            Strategy::EducationalOptimized => EducationalOptimized.select(ctx, candidates, task),
            _ => WeightedRoundRobin.select(ctx, candidates, task),
        }
    }
}
