//! Worker capability interface and per-worker tracked state

use crate::config::BottleneckThresholds;
use crate::metrics::ResourceMetrics;
use crate::models::{push_capped, PerformanceSample, WorkloadTrend};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Maximum samples retained in a worker's performance history
pub const PERFORMANCE_HISTORY_CAP: usize = 100;

/// Maximum load-factor samples retained per worker
pub const LOAD_HISTORY_CAP: usize = 100;

/// Samples considered when computing predictions and trend
pub const PREDICTION_WINDOW: usize = 10;

/// Samples required before predictions are refreshed
pub const MIN_SAMPLES_FOR_PREDICTION: usize = 3;

/// Samples required before the workload trend is classified
pub const MIN_SAMPLES_FOR_TREND: usize = 5;

/// An external unit of execution that tasks are dispatched to
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable identifier
    fn id(&self) -> &str;

    /// Self-reported busyness in [0, 1]
    async fn load_factor(&self) -> f64;

    /// Tasks currently in flight, if the worker tracks them
    fn current_tasks(&self) -> Option<u32> {
        None
    }

    /// Subjects this worker declares expertise in
    fn specializations(&self) -> &[String] {
        &[]
    }
}

/// Everything the balancer tracks about one registered worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerResourceState {
    pub worker_id: String,
    pub current_metrics: ResourceMetrics,
    pub load_factor: f64,
    pub capabilities: BTreeMap<String, f64>,
    pub capability_score: f64,
    pub educational_specializations: Vec<String>,
    pub educational_specialization_score: f64,
    pub performance_history: VecDeque<PerformanceSample>,
    pub load_history: VecDeque<f64>,
    pub predicted_completion_time: f64,
    pub predicted_quality_score: f64,
    pub workload_trend: WorkloadTrend,
    pub last_updated: i64,
}

impl WorkerResourceState {
    pub fn new(
        worker_id: impl Into<String>,
        metrics: ResourceMetrics,
        capabilities: BTreeMap<String, f64>,
        specializations: Vec<String>,
    ) -> Self {
        let capability_score = if capabilities.is_empty() {
            1.0
        } else {
            capabilities.values().sum::<f64>() / capabilities.len() as f64
        };
        let educational_specialization_score = specializations.len() as f64 * 0.1 + 1.0;

        Self {
            worker_id: worker_id.into(),
            current_metrics: metrics,
            load_factor: 0.0,
            capabilities,
            capability_score,
            educational_specializations: specializations,
            educational_specialization_score,
            performance_history: VecDeque::with_capacity(PERFORMANCE_HISTORY_CAP),
            load_history: VecDeque::with_capacity(LOAD_HISTORY_CAP),
            predicted_completion_time: 0.0,
            predicted_quality_score: 0.0,
            workload_trend: WorkloadTrend::Stable,
            last_updated: chrono::Utc::now().timestamp(),
        }
    }

    /// Append a completed-task sample and refresh predictions and trend
    pub fn update_performance_history(&mut self, duration_secs: f64, quality: f64) {
        let timestamp = chrono::Utc::now().timestamp();
        push_capped(
            &mut self.performance_history,
            PerformanceSample {
                timestamp,
                duration_secs,
                quality,
            },
            PERFORMANCE_HISTORY_CAP,
        );
        self.last_updated = timestamp;

        let len = self.performance_history.len();
        if len < MIN_SAMPLES_FOR_PREDICTION {
            return;
        }

        let window: Vec<&PerformanceSample> = self
            .performance_history
            .iter()
            .skip(len.saturating_sub(PREDICTION_WINDOW))
            .collect();
        let count = window.len() as f64;
        self.predicted_completion_time =
            window.iter().map(|s| s.duration_secs).sum::<f64>() / count;
        self.predicted_quality_score = window.iter().map(|s| s.quality).sum::<f64>() / count;

        if len >= MIN_SAMPLES_FOR_TREND {
            let durations: Vec<f64> = window.iter().map(|s| s.duration_secs).collect();
            self.workload_trend = classify_trend(&durations);
        }
    }

    /// Set the load factor and append it to the load history
    pub fn record_load(&mut self, load_factor: f64) {
        self.load_factor = load_factor.clamp(0.0, 1.0);
        push_capped(&mut self.load_history, self.load_factor, LOAD_HISTORY_CAP);
    }

    /// Apply a live reading of the worker's load and in-flight tasks
    pub fn refresh_live(
        &mut self,
        load_factor: f64,
        current_tasks: Option<u32>,
        thresholds: &BottleneckThresholds,
    ) {
        self.record_load(load_factor);
        if let Some(tasks) = current_tasks {
            self.current_metrics.active_tasks = tasks;
        }
        self.current_metrics.recompute_derived_with(thresholds);
        self.last_updated = chrono::Utc::now().timestamp();
    }

    /// Fold a task outcome into the worker's own counters
    pub fn record_outcome(&mut self, success: bool, thresholds: &BottleneckThresholds) {
        let metrics = &mut self.current_metrics;
        if success {
            metrics.completed_tasks += 1;
        } else {
            metrics.failed_tasks += 1;
        }
        let total = metrics.completed_tasks + metrics.failed_tasks;
        metrics.error_rate = metrics.failed_tasks as f64 / total as f64;

        if let Some(last) = self.performance_history.back() {
            metrics.response_time = last.duration_secs;
        }
        if !self.performance_history.is_empty() {
            let count = self.performance_history.len() as f64;
            metrics.average_task_duration =
                self.performance_history.iter().map(|s| s.duration_secs).sum::<f64>() / count;
            metrics.quality_score =
                self.performance_history.iter().map(|s| s.quality).sum::<f64>() / count;
        }
        metrics.recompute_derived_with(thresholds);
    }
}

/// Compare the two halves of a duration window
///
/// The second half averaging more than 10% above the first is increasing,
/// more than 10% below is decreasing.
pub fn classify_trend(durations: &[f64]) -> WorkloadTrend {
    if durations.len() < 2 {
        return WorkloadTrend::Stable;
    }
    let mid = durations.len() / 2;
    let (first, second) = durations.split_at(mid);
    let first_avg = first.iter().sum::<f64>() / first.len() as f64;
    let second_avg = second.iter().sum::<f64>() / second.len() as f64;

    if second_avg > first_avg * 1.1 {
        WorkloadTrend::Increasing
    } else if second_avg < first_avg * 0.9 {
        WorkloadTrend::Decreasing
    } else {
        WorkloadTrend::Stable
    }
}
