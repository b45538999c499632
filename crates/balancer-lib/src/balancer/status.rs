//! Point-in-time view of the balancer for status endpoints

use super::state::BalancerState;
use super::Lifecycle;
use crate::alerts::{BottleneckAlert, RECENT_ALERTS};
use crate::config::Strategy;
use crate::models::WorkloadTrend;
use crate::predictor::CapacityForecast;
use crate::strategy::MIN_WEIGHT;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub load_factor: f64,
    pub weight: u32,
    pub utilization: f64,
    pub health_score: f64,
    pub predicted_completion_time: f64,
    pub predicted_quality_score: f64,
    pub workload_trend: WorkloadTrend,
    pub specializations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub utilization: f64,
    pub health_score: f64,
    pub error_rate: f64,
    pub bottlenecks: Vec<String>,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub enabled: bool,
    pub pending: usize,
    pub batch_size: usize,
}

/// Snapshot returned by `get_load_balancing_status`
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancingStatus {
    pub lifecycle: Lifecycle,
    pub strategy: Strategy,
    pub worker_count: usize,
    pub workers: BTreeMap<String, WorkerStatus>,
    /// Allocations per worker among the most recent ones
    pub recent_allocations: BTreeMap<String, u64>,
    pub average_quality: f64,
    pub recent_alerts: Vec<BottleneckAlert>,
    pub subject_distribution: BTreeMap<String, u64>,
    pub grade_level_distribution: BTreeMap<u32, u64>,
    pub batch: BatchStatus,
    pub load_predictions: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_forecast: Option<CapacityForecast>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSummary>,
    pub generated_at: i64,
}

impl LoadBalancingStatus {
    pub(super) fn capture(
        state: &BalancerState,
        lifecycle: Lifecycle,
        strategy: Strategy,
        batch_size: usize,
    ) -> Self {
        let workers = state
            .worker_states
            .iter()
            .map(|(id, s)| {
                (
                    id.clone(),
                    WorkerStatus {
                        load_factor: s.load_factor,
                        weight: state.weights.get(id).copied().unwrap_or(MIN_WEIGHT),
                        utilization: s.current_metrics.overall_utilization(),
                        health_score: s.current_metrics.health_score(),
                        predicted_completion_time: s.predicted_completion_time,
                        predicted_quality_score: s.predicted_quality_score,
                        workload_trend: s.workload_trend,
                        specializations: s.educational_specializations.clone(),
                    },
                )
            })
            .collect();

        let skip = state.alerts.len().saturating_sub(RECENT_ALERTS);
        let recent_alerts = state.alerts.iter().skip(skip).cloned().collect();

        let system = state.current_system().map(|m| SystemSummary {
            utilization: m.overall_utilization(),
            health_score: m.health_score(),
            error_rate: m.error_rate,
            bottlenecks: m.bottleneck_indicators().to_vec(),
            samples: state.system_history.len(),
        });

        Self {
            lifecycle,
            strategy,
            worker_count: state.worker_states.len(),
            workers,
            recent_allocations: state.recent_distribution().into_iter().collect(),
            average_quality: state
                .recent_allocation_stats()
                .map_or(0.0, |s| s.average_quality),
            recent_alerts,
            subject_distribution: state
                .subject_distribution
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            grade_level_distribution: state
                .grade_distribution
                .iter()
                .map(|(k, v)| (*k, *v))
                .collect(),
            batch: BatchStatus {
                enabled: state.batch.is_enabled(),
                pending: state.batch.len(),
                batch_size,
            },
            load_predictions: state
                .load_predictions
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            capacity_forecast: state.capacity_forecast.clone(),
            system,
            generated_at: chrono::Utc::now().timestamp(),
        }
    }
}
