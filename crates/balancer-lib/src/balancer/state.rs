//! Mutable balancer state and the synchronous rules applied to it

use super::batch::BatchQueue;
use crate::alerts::{BottleneckAlert, ALERT_HIGH_WATER, ALERT_RETAIN};
use crate::config::Strategy;
use crate::metrics::ResourceMetrics;
use crate::models::{push_capped, push_trimmed, AllocationRecord, SelectionRecord, Task};
use crate::predictor::{forecast_value, variance, CapacityForecast};
use crate::strategy::{SelectionCursors, MAX_WEIGHT, MIN_WEIGHT};
use crate::worker::WorkerResourceState;
use std::collections::{HashMap, VecDeque};

pub const SELECTION_HISTORY_CAP: usize = 1000;
pub const ALLOCATION_HIGH_WATER: usize = 10_000;
pub const ALLOCATION_RETAIN: usize = 5_000;
pub const SYSTEM_HISTORY_CAP: usize = 1000;

/// Allocations considered when judging recent performance
pub const ADAPTATION_WINDOW: usize = 100;

/// Allocations required before the strategy may be switched
pub const MIN_ALLOCATIONS_FOR_ADAPTATION: usize = 10;

const REBALANCE_VARIANCE: f64 = 0.1;
const OVERLOAD: f64 = 0.9;
const SKEW_FACTOR: f64 = 2.0;

/// Success rate below which adaptation favours spare capacity
const ADAPT_SUCCESS_FLOOR: f64 = 0.9;

/// Average quality below which adaptation favours quality
const ADAPT_QUALITY_FLOOR: f64 = 0.7;

/// Summary of the most recent allocations
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AllocationStats {
    pub count: usize,
    pub success_rate: f64,
    pub average_quality: f64,
    pub average_duration: f64,
}

/// One over-represented subject or grade level
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SkewReport {
    pub dimension: &'static str,
    pub key: String,
    pub count: u64,
    pub mean: f64,
}

#[derive(Debug, Default)]
pub(crate) struct BalancerState {
    pub worker_states: HashMap<String, WorkerResourceState>,
    pub weights: HashMap<String, u32>,
    pub cursors: SelectionCursors,
    pub selection_history: VecDeque<SelectionRecord>,
    pub allocation_history: VecDeque<AllocationRecord>,
    pub alerts: VecDeque<BottleneckAlert>,
    pub subject_distribution: HashMap<String, u64>,
    pub grade_distribution: HashMap<u32, u64>,
    pub system_history: VecDeque<ResourceMetrics>,
    pub load_predictions: HashMap<String, f64>,
    pub capacity_forecast: Option<CapacityForecast>,
    pub batch: BatchQueue,
}

impl BalancerState {
    /// Insert or overwrite a worker and reset its weight
    pub fn register(&mut self, state: WorkerResourceState) {
        self.weights.insert(state.worker_id.clone(), MIN_WEIGHT);
        self.load_predictions.remove(&state.worker_id);
        self.worker_states.insert(state.worker_id.clone(), state);
    }

    pub fn unregister(&mut self, worker_id: &str) -> bool {
        self.weights.remove(worker_id);
        self.load_predictions.remove(worker_id);
        self.worker_states.remove(worker_id).is_some()
    }

    pub fn current_system(&self) -> Option<&ResourceMetrics> {
        self.system_history.back()
    }

    pub fn push_system_metrics(&mut self, metrics: ResourceMetrics) {
        push_capped(&mut self.system_history, metrics, SYSTEM_HISTORY_CAP);
    }

    pub fn push_alert(&mut self, alert: BottleneckAlert) {
        push_trimmed(&mut self.alerts, alert, ALERT_HIGH_WATER, ALERT_RETAIN);
    }

    /// Append to the selection history and, when tracking is on, count the
    /// task's subject and grade level
    pub fn record_selection(
        &mut self,
        worker_id: &str,
        strategy: Strategy,
        task: Option<&Task>,
        candidates: usize,
        track_distribution: bool,
    ) {
        push_capped(
            &mut self.selection_history,
            SelectionRecord {
                timestamp: chrono::Utc::now().timestamp(),
                worker_id: worker_id.to_string(),
                strategy: strategy.as_str().to_string(),
                task_type: task.and_then(|t| t.task_type.clone()),
                candidates,
            },
            SELECTION_HISTORY_CAP,
        );

        if !track_distribution {
            return;
        }
        if let Some(task) = task {
            if let Some(subject) = task.subject() {
                *self
                    .subject_distribution
                    .entry(subject.to_string())
                    .or_insert(0) += 1;
            }
            if let Some(grade) = task.grade_level() {
                *self.grade_distribution.entry(grade).or_insert(0) += 1;
            }
        }
    }

    /// Nudge a worker's weight after a task outcome; returns the new weight
    pub fn adjust_weight(&mut self, worker_id: &str, success: bool, quality: f64) -> u32 {
        let weight = self
            .weights
            .entry(worker_id.to_string())
            .or_insert(MIN_WEIGHT);
        if success && quality > 0.8 {
            *weight = (*weight + 1).min(MAX_WEIGHT);
        } else if !success || quality < 0.5 {
            *weight = weight.saturating_sub(1).max(MIN_WEIGHT);
        }
        *weight
    }

    pub fn record_allocation(&mut self, worker_id: &str, duration_secs: f64, quality: f64, success: bool) {
        push_trimmed(
            &mut self.allocation_history,
            AllocationRecord {
                timestamp: chrono::Utc::now().timestamp(),
                worker_id: worker_id.to_string(),
                duration_secs,
                quality,
                success,
            },
            ALLOCATION_HIGH_WATER,
            ALLOCATION_RETAIN,
        );
    }

    fn recent_allocations(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.allocation_history
            .iter()
            .skip(self.allocation_history.len().saturating_sub(ADAPTATION_WINDOW))
    }

    /// Statistics over the last [`ADAPTATION_WINDOW`] allocations
    pub fn recent_allocation_stats(&self) -> Option<AllocationStats> {
        let recent: Vec<&AllocationRecord> = self.recent_allocations().collect();
        if recent.is_empty() {
            return None;
        }
        let count = recent.len() as f64;
        Some(AllocationStats {
            count: recent.len(),
            success_rate: recent.iter().filter(|a| a.success).count() as f64 / count,
            average_quality: recent.iter().map(|a| a.quality).sum::<f64>() / count,
            average_duration: recent.iter().map(|a| a.duration_secs).sum::<f64>() / count,
        })
    }

    /// Allocation counts per worker over the recent window
    pub fn recent_distribution(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for allocation in self.recent_allocations() {
            *counts.entry(allocation.worker_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn loads(&self) -> Vec<f64> {
        self.worker_states.values().map(|s| s.load_factor).collect()
    }

    pub fn load_variance(&self) -> f64 {
        variance(&self.loads())
    }

    pub fn should_rebalance(&self) -> bool {
        if self.worker_states.is_empty() {
            return false;
        }
        self.load_variance() > REBALANCE_VARIANCE
            || self.worker_states.values().any(|s| s.load_factor > OVERLOAD)
            || self
                .worker_states
                .values()
                .any(|s| s.current_metrics.has_bottlenecks())
    }

    /// Shift weight toward lightly loaded, high quality workers; returns the
    /// number of weights changed
    pub fn rebalance_weights(&mut self) -> usize {
        let mut changed = 0;
        for (worker_id, state) in &self.worker_states {
            let weight = self.weights.entry(worker_id.clone()).or_insert(MIN_WEIGHT);
            let before = *weight;
            let quality = state.predicted_quality_score;
            if state.load_factor < 0.5 && quality > 0.8 {
                *weight = (*weight + 1).min(MAX_WEIGHT);
            } else if state.load_factor > 0.8 || quality < 0.6 {
                *weight = weight.saturating_sub(1).max(MIN_WEIGHT);
            }
            if *weight != before {
                changed += 1;
            }
        }
        changed
    }

    /// Fill the task-related fields of a system snapshot from tracked state
    pub fn aggregate_task_metrics(&self, metrics: &mut ResourceMetrics) {
        let workers = self.worker_states.values();
        metrics.active_tasks = workers
            .clone()
            .map(|s| s.current_metrics.active_tasks)
            .sum();
        metrics.completed_tasks = workers
            .clone()
            .map(|s| s.current_metrics.completed_tasks)
            .sum();
        metrics.failed_tasks = workers.map(|s| s.current_metrics.failed_tasks).sum();
        metrics.queued_tasks = u32::try_from(self.batch.len()).unwrap_or(u32::MAX);

        if let Some(stats) = self.recent_allocation_stats() {
            metrics.average_task_duration = stats.average_duration;
            metrics.response_time = stats.average_duration;
            metrics.quality_score = stats.average_quality;
            metrics.error_rate = 1.0 - stats.success_rate;
        }

        let minute_ago = metrics.timestamp - 60;
        metrics.throughput_per_minute = self
            .allocation_history
            .iter()
            .rev()
            .take_while(|a| a.timestamp >= minute_ago)
            .count() as f64;
    }

    /// Next-interval load forecast for every worker with load history
    pub fn refresh_load_predictions(&mut self) {
        self.load_predictions = self
            .worker_states
            .iter()
            .filter(|(_, s)| !s.load_history.is_empty())
            .map(|(id, s)| {
                let history: Vec<f64> = s.load_history.iter().copied().collect();
                (id.clone(), forecast_value(&history, 1.0).clamp(0.0, 1.0))
            })
            .collect();
    }

    /// Subjects and grade levels assigned more than twice the mean
    pub fn distribution_skew(&self) -> Vec<SkewReport> {
        let mut reports = skewed("subject", &self.subject_distribution);
        reports.extend(skewed("grade_level", &self.grade_distribution));
        reports
    }
}

fn skewed<K: ToString + Ord>(dimension: &'static str, counts: &HashMap<K, u64>) -> Vec<SkewReport> {
    if counts.is_empty() {
        return Vec::new();
    }
    let mean = counts.values().sum::<u64>() as f64 / counts.len() as f64;
    let mut over: Vec<(&K, u64)> = counts
        .iter()
        .filter(|(_, count)| **count as f64 > SKEW_FACTOR * mean)
        .map(|(key, &count)| (key, count))
        .collect();
    over.sort_by(|a, b| a.0.cmp(b.0));
    over.into_iter()
        .map(|(key, count)| SkewReport {
            dimension,
            key: key.to_string(),
            count,
            mean,
        })
        .collect()
}

/// Strategy the adaptive rebalancer would move to, given recent outcomes
///
/// Returns `None` until enough allocations have been recorded.
pub(crate) fn choose_adaptive_strategy(
    stats: Option<AllocationStats>,
    quality_optimization: bool,
) -> Option<Strategy> {
    let stats = stats?;
    if stats.count < MIN_ALLOCATIONS_FOR_ADAPTATION {
        return None;
    }
    if stats.success_rate < ADAPT_SUCCESS_FLOOR {
        Some(Strategy::ResourceAware)
    } else if quality_optimization && stats.average_quality < ADAPT_QUALITY_FLOOR {
        Some(Strategy::QualityAware)
    } else {
        Some(Strategy::EducationalOptimized)
    }
}
