//! Capacity planning from system metrics history

use super::trend::{calculate_trend, forecast_value};
use crate::error::{BalancerError, Result};
use crate::metrics::ResourceMetrics;
use serde::Serialize;

/// Most recent system samples considered for predictions
pub const PREDICTION_LOOKBACK: usize = 20;

/// Samples required before a resource prediction is produced
pub const MIN_PREDICTION_SAMPLES: usize = 5;

/// Fixed confidence reported with every resource prediction
pub const PREDICTION_CONFIDENCE: f64 = 0.7;

/// Collection intervals the background forecast looks ahead
pub const FORECAST_PERIODS: f64 = 6.0;

/// Minutes represented by one step of the trend when projecting a horizon
const MINUTES_PER_PERIOD: f64 = 10.0;

/// Suggested capacity action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingRecommendation {
    ScaleUp,
    ScaleDown,
    Maintain,
}

impl std::fmt::Display for ScalingRecommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalingRecommendation::ScaleUp => write!(f, "scale_up"),
            ScalingRecommendation::ScaleDown => write!(f, "scale_down"),
            ScalingRecommendation::Maintain => write!(f, "maintain"),
        }
    }
}

/// CPU, memory and pending-task figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceFigures {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub tasks: f64,
}

/// Result of `predict_resource_needs`
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePrediction {
    pub time_horizon_minutes: u32,
    pub current: ResourceFigures,
    pub predicted: ResourceFigures,
    /// Per-sample slopes
    pub trends: ResourceFigures,
    pub recommendation: ScalingRecommendation,
    pub confidence: f64,
    pub samples_used: usize,
    pub generated_at: i64,
}

/// Short-horizon forecast refreshed by the prediction loop
#[derive(Debug, Clone, Serialize)]
pub struct CapacityForecast {
    pub periods_ahead: f64,
    pub forecast: ResourceFigures,
    pub samples_used: usize,
    pub generated_at: i64,
}

fn pending_tasks(m: &ResourceMetrics) -> f64 {
    f64::from(m.active_tasks) + f64::from(m.queued_tasks)
}

fn lookback(history: &[ResourceMetrics]) -> &[ResourceMetrics] {
    &history[history.len().saturating_sub(PREDICTION_LOOKBACK)..]
}

/// Project resource needs `horizon_minutes` ahead and recommend an action
pub fn predict_resource_needs(
    history: &[ResourceMetrics],
    horizon_minutes: u32,
) -> Result<ResourcePrediction> {
    let window = lookback(history);
    if window.len() < MIN_PREDICTION_SAMPLES {
        return Err(BalancerError::InsufficientHistory {
            available: window.len(),
            required: MIN_PREDICTION_SAMPLES,
        });
    }

    let cpu: Vec<f64> = window.iter().map(|m| m.cpu_percent).collect();
    let memory: Vec<f64> = window.iter().map(|m| m.memory_percent).collect();
    let tasks: Vec<f64> = window.iter().map(pending_tasks).collect();

    let trends = ResourceFigures {
        cpu_percent: calculate_trend(&cpu),
        memory_percent: calculate_trend(&memory),
        tasks: calculate_trend(&tasks),
    };

    // Guarded by the length check above
    let latest = &window[window.len() - 1];
    let current = ResourceFigures {
        cpu_percent: latest.cpu_percent,
        memory_percent: latest.memory_percent,
        tasks: pending_tasks(latest),
    };

    let time_factor = f64::from(horizon_minutes) / MINUTES_PER_PERIOD;
    let predicted = ResourceFigures {
        cpu_percent: (current.cpu_percent + trends.cpu_percent * time_factor).clamp(0.0, 100.0),
        memory_percent: (current.memory_percent + trends.memory_percent * time_factor)
            .clamp(0.0, 100.0),
        tasks: (current.tasks + trends.tasks * time_factor).max(0.0),
    };

    Ok(ResourcePrediction {
        time_horizon_minutes: horizon_minutes,
        current,
        predicted,
        trends,
        recommendation: recommend(&current, &predicted),
        confidence: PREDICTION_CONFIDENCE,
        samples_used: window.len(),
        generated_at: chrono::Utc::now().timestamp(),
    })
}

/// Fixed-threshold scaling decision
pub fn recommend(current: &ResourceFigures, predicted: &ResourceFigures) -> ScalingRecommendation {
    if predicted.cpu_percent > 80.0
        || predicted.memory_percent > 80.0
        || predicted.tasks > current.tasks * 1.5
    {
        ScalingRecommendation::ScaleUp
    } else if predicted.cpu_percent < 30.0
        && predicted.memory_percent < 50.0
        && predicted.tasks < current.tasks * 0.7
    {
        ScalingRecommendation::ScaleDown
    } else {
        ScalingRecommendation::Maintain
    }
}

/// Extrapolate CPU, memory and pending tasks `periods_ahead` samples out
///
/// Returns `None` until there are enough samples to fit a trend.
pub fn forecast_capacity(history: &[ResourceMetrics], periods_ahead: f64) -> Option<CapacityForecast> {
    let window = lookback(history);
    if window.len() < MIN_PREDICTION_SAMPLES {
        return None;
    }

    let cpu: Vec<f64> = window.iter().map(|m| m.cpu_percent).collect();
    let memory: Vec<f64> = window.iter().map(|m| m.memory_percent).collect();
    let tasks: Vec<f64> = window.iter().map(pending_tasks).collect();

    Some(CapacityForecast {
        periods_ahead,
        forecast: ResourceFigures {
            cpu_percent: forecast_value(&cpu, periods_ahead).clamp(0.0, 100.0),
            memory_percent: forecast_value(&memory, periods_ahead).clamp(0.0, 100.0),
            tasks: forecast_value(&tasks, periods_ahead).max(0.0),
        },
        samples_used: window.len(),
        generated_at: chrono::Utc::now().timestamp(),
    })
}
