//! Rotation-based strategies

use super::{Candidate, SelectionContext, Selector};
use crate::config::Strategy;
use crate::models::Task;
use tracing::trace;

/// Cycles through candidates in order
pub struct RoundRobin;

impl Selector for RoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::RoundRobin
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        let index = ctx.cursors.round_robin % candidates.len();
        ctx.cursors.round_robin = ctx.cursors.round_robin.wrapping_add(1);
        index
    }
}

/// Cycles through candidates repeated by their integer weight
pub struct WeightedRoundRobin;

impl Selector for WeightedRoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }

    fn select(
        &self,
        ctx: &mut SelectionContext<'_>,
        candidates: &[Candidate<'_>],
        _task: Option<&Task>,
    ) -> usize {
        let expanded: Vec<usize> = candidates
            .iter()
            .enumerate()
            .flat_map(|(index, candidate)| {
                std::iter::repeat(index).take(ctx.weight(candidate.id) as usize)
            })
            .collect();

        let slot = ctx.cursors.weighted % expanded.len();
        ctx.cursors.weighted = ctx.cursors.weighted.wrapping_add(1);
        trace!(slot, slots = expanded.len(), "Weighted rotation");
        expanded[slot]
    }
}
