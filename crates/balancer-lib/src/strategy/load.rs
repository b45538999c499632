//! Load, latency and quality driven strategies

use super::{first_max, first_min, Candidate, SelectionContext, Selector};
use crate::config::Strategy;
use crate::models::Task;

/// Penalty applied per unit of load when ranking by quality
const QUALITY_LOAD_PENALTY: f64 = 0.3;

/// Fewest in-flight tasks
pub struct LeastConnections;

impl Selector for LeastConnections {
    fn strategy(&self) -> Strategy {
        Strategy::LeastConnections
    }

    fn select(
        &self,
        _ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        first_min(candidates, f64::INFINITY, 0, |c| {
            Some(f64::from(c.current_tasks.unwrap_or(0)))
        })
    }
}

/// Shortest predicted completion time among tracked workers
pub struct LeastResponseTime;

impl Selector for LeastResponseTime {
    fn strategy(&self) -> Strategy {
        Strategy::LeastResponseTime
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        first_min(candidates, f64::INFINITY, 0, |c| {
            ctx.state(c.id).map(|s| s.predicted_completion_time)
        })
    }
}

/// Lowest overall utilization, only if below full utilization
pub struct ResourceAware;

impl Selector for ResourceAware {
    fn strategy(&self) -> Strategy {
        Strategy::ResourceAware
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        first_min(candidates, 1.0, 0, |c| {
            ctx.state(c.id)
                .map(|s| s.current_metrics.overall_utilization())
        })
    }
}

/// Highest predicted quality, discounted by load
pub struct QualityAware;

impl Selector for QualityAware {
    fn strategy(&self) -> Strategy {
        Strategy::QualityAware
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        first_max(candidates, 0.0, 0, |c| {
            ctx.state(c.id)
                .map(|s| s.predicted_quality_score - QUALITY_LOAD_PENALTY * s.load_factor)
        })
    }
}
