//! Load balancing configuration

use crate::error::{BalancerError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Worker selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    LeastResponseTime,
    ResourceAware,
    QualityAware,
    EducationalOptimized,
    #[default]
    Adaptive,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::RoundRobin,
        Strategy::WeightedRoundRobin,
        Strategy::LeastConnections,
        Strategy::LeastResponseTime,
        Strategy::ResourceAware,
        Strategy::QualityAware,
        Strategy::EducationalOptimized,
        Strategy::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
            Strategy::LeastConnections => "least_connections",
            Strategy::LeastResponseTime => "least_response_time",
            Strategy::ResourceAware => "resource_aware",
            Strategy::QualityAware => "quality_aware",
            Strategy::EducationalOptimized => "educational_optimized",
            Strategy::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| BalancerError::InvalidConfig(format!("unknown strategy: {s}")))
    }
}

/// Alert thresholds for bottleneck detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckThresholds {
    /// CPU usage percentage above which the CPU is flagged
    pub cpu_percent: f64,
    /// Memory usage percentage above which memory is flagged
    pub memory_percent: f64,
    /// Queued tasks above this multiple of active tasks flag a backlog
    pub queue_ratio: f64,
    /// Error rate above which failures are flagged
    pub error_rate: f64,
    /// Average task duration (seconds) above which tasks are flagged as slow
    pub task_duration_secs: f64,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 85.0,
            memory_percent: 85.0,
            queue_ratio: 2.0,
            error_rate: 0.1,
            task_duration_secs: 300.0,
        }
    }
}

/// Load balancer configuration
///
/// Set once at construction. Only the adaptive rebalancing pass writes to it
/// afterwards, and only the `strategy` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancingConfig {
    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default = "default_true")]
    pub enable_adaptive_strategy: bool,

    #[serde(default = "default_true")]
    pub enable_predictive_scaling: bool,

    /// Allows adaptation to switch to quality-aware selection
    #[serde(default = "default_true")]
    pub enable_quality_optimization: bool,

    #[serde(default = "default_metrics_interval")]
    pub metrics_collection_interval_secs: u64,

    #[serde(default = "default_rebalancing_interval")]
    pub rebalancing_interval_secs: u64,

    #[serde(default = "default_prediction_interval")]
    pub prediction_interval_secs: u64,

    #[serde(default)]
    pub thresholds: BottleneckThresholds,

    /// Adds a flat bonus when the task subject matches a worker specialization
    #[serde(default = "default_true")]
    pub subject_specialization_bonus: bool,

    /// Adds a flat bonus for under-represented grade levels
    #[serde(default = "default_true")]
    pub grade_level_balancing: bool,

    /// Records subject and grade-level counts for every selection
    #[serde(default = "default_true")]
    pub track_content_distribution: bool,

    #[serde(default = "default_performance_weight")]
    pub performance_weight: f64,

    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,

    #[serde(default = "default_educational_weight")]
    pub educational_weight: f64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_rebalancing_interval() -> u64 {
    60
}

fn default_prediction_interval() -> u64 {
    300
}

fn default_performance_weight() -> f64 {
    0.4
}

fn default_quality_weight() -> f64 {
    0.4
}

fn default_educational_weight() -> f64 {
    0.2
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout() -> u64 {
    5
}

/// Allowed deviation of the composite weights from 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 0.05;

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            enable_adaptive_strategy: true,
            enable_predictive_scaling: true,
            enable_quality_optimization: true,
            metrics_collection_interval_secs: default_metrics_interval(),
            rebalancing_interval_secs: default_rebalancing_interval(),
            prediction_interval_secs: default_prediction_interval(),
            thresholds: BottleneckThresholds::default(),
            subject_specialization_bonus: true,
            grade_level_balancing: true,
            track_content_distribution: true,
            performance_weight: default_performance_weight(),
            quality_weight: default_quality_weight(),
            educational_weight: default_educational_weight(),
            batch_size: default_batch_size(),
            batch_timeout_secs: default_batch_timeout(),
        }
    }
}

impl LoadBalancingConfig {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn metrics_collection_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_collection_interval_secs)
    }

    pub fn rebalancing_interval(&self) -> Duration {
        Duration::from_secs(self.rebalancing_interval_secs)
    }

    pub fn prediction_interval(&self) -> Duration {
        Duration::from_secs(self.prediction_interval_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// Reject configurations the loops and scorers cannot run with
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("metrics_collection_interval_secs", self.metrics_collection_interval_secs),
            ("rebalancing_interval_secs", self.rebalancing_interval_secs),
            ("prediction_interval_secs", self.prediction_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(BalancerError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(BalancerError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        let weights = [
            ("performance_weight", self.performance_weight),
            ("quality_weight", self.quality_weight),
            ("educational_weight", self.educational_weight),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(BalancerError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let sum = self.performance_weight + self.quality_weight + self.educational_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(BalancerError::InvalidConfig(format!(
                "scoring weights must sum to 1.0, got {sum:.3}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LoadBalancingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, Strategy::Adaptive);
        assert_eq!(config.metrics_collection_interval(), Duration::from_secs(30));
        assert_eq!(config.thresholds.cpu_percent, 85.0);
    }

    #[test]
    fn test_weight_sum_rejected() {
        let config = LoadBalancingConfig {
            quality_weight: 0.9,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = LoadBalancingConfig {
            rebalancing_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_round_trips_through_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fastest".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LoadBalancingConfig = serde_json::from_str(
            r#"{"strategy": "quality_aware", "thresholds": {"cpu_percent": 90.0}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::QualityAware);
        assert_eq!(config.thresholds.cpu_percent, 90.0);
        assert_eq!(config.thresholds.memory_percent, 85.0);
        assert_eq!(config.batch_size, 10);
        assert!(config.enable_adaptive_strategy);
    }
}
