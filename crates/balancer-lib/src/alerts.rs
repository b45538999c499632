//! Bottleneck alerts raised by the monitoring loop

use crate::metrics::ResourceMetrics;
use serde::{Deserialize, Serialize};

/// Alerts kept before the log is trimmed
pub const ALERT_HIGH_WATER: usize = 1000;

/// Alerts retained after a trim
pub const ALERT_RETAIN: usize = 500;

/// Alerts surfaced in the status snapshot
pub const RECENT_ALERTS: usize = 10;

/// Indicator count at which an alert is escalated
const CRITICAL_INDICATORS: usize = 3;

/// Health score below which an alert is escalated
const CRITICAL_HEALTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// What the alert was raised against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertScope {
    System,
    Worker,
}

impl std::fmt::Display for AlertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertScope::System => write!(f, "system"),
            AlertScope::Worker => write!(f, "worker"),
        }
    }
}

/// One bottleneck observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckAlert {
    pub timestamp: i64,
    pub scope: AlertScope,
    /// Set for worker-scoped alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub severity: AlertSeverity,
    pub indicators: Vec<String>,
    pub overall_utilization: f64,
    pub health_score: f64,
}

impl BottleneckAlert {
    /// Build an alert from metrics whose derived fields are current
    ///
    /// Returns `None` when the metrics carry no bottleneck indicators.
    pub fn from_metrics(worker_id: Option<&str>, metrics: &ResourceMetrics) -> Option<Self> {
        let indicators = metrics.bottleneck_indicators();
        if indicators.is_empty() {
            return None;
        }

        let severity = if indicators.len() >= CRITICAL_INDICATORS
            || metrics.health_score() < CRITICAL_HEALTH
        {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        Some(Self {
            timestamp: chrono::Utc::now().timestamp(),
            scope: if worker_id.is_some() {
                AlertScope::Worker
            } else {
                AlertScope::System
            },
            worker_id: worker_id.map(str::to_string),
            severity,
            indicators: indicators.to_vec(),
            overall_utilization: metrics.overall_utilization(),
            health_score: metrics.health_score(),
        })
    }

    /// Worker id, or `"system"` for system-wide alerts
    pub fn source(&self) -> &str {
        self.worker_id.as_deref().unwrap_or("system")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_alert_without_indicators() {
        let metrics = ResourceMetrics::default();
        assert!(BottleneckAlert::from_metrics(None, &metrics).is_none());
    }

    #[test]
    fn test_system_alert_is_warning() {
        let mut metrics = ResourceMetrics::default();
        metrics.cpu_percent = 90.0;
        metrics.quality_score = 0.9;
        metrics.recompute_derived();

        let alert = BottleneckAlert::from_metrics(None, &metrics).unwrap();
        assert_eq!(alert.scope, AlertScope::System);
        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert_eq!(alert.indicators.len(), 1);
        assert_eq!(alert.source(), "system");
    }

    #[test]
    fn test_worker_alert_escalates() {
        let mut metrics = ResourceMetrics::default();
        metrics.cpu_percent = 95.0;
        metrics.memory_percent = 95.0;
        metrics.error_rate = 0.4;
        metrics.recompute_derived();

        let alert = BottleneckAlert::from_metrics(Some("agent-1"), &metrics).unwrap();
        assert_eq!(alert.scope, AlertScope::Worker);
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.source(), "agent-1");

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["scope"], "worker");
        assert_eq!(json["severity"], "critical");
    }
}
