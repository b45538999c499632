//! Component health for the balancer's background loops
//!
//! Each loop reports the outcome of every iteration. A single failure marks
//! the component degraded; repeated consecutive failures mark it unhealthy,
//! which also takes the service out of readiness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which a component is considered unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

pub mod components {
    pub const MONITOR: &str = "monitor";
    pub const REBALANCER: &str = "rebalancer";
    pub const FORECASTER: &str = "forecaster";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Worst of two statuses
    fn worst(self, other: ComponentStatus) -> ComponentStatus {
        use ComponentStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Healthy => write!(f, "healthy"),
            ComponentStatus::Degraded => write!(f, "degraded"),
            ComponentStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Aggregate health served on `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Readiness served on `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared, cloneable view of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a successful iteration, clearing any failure streak
    pub async fn record_success(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a failed iteration
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut components = self.components.write().await;
        let entry = components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy);

        entry.consecutive_failures += 1;
        entry.status = if entry.consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        entry.message = Some(message.into());
        entry.last_check_timestamp = chrono::Utc::now().timestamp();
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthReport {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .fold(ComponentStatus::Healthy, |acc, c| acc.worst(c.status));
        HealthReport { status, components }
    }

    pub async fn readiness(&self) -> Readiness {
        if !*self.ready.read().await {
            return Readiness {
                ready: false,
                reason: Some("Load balancer not running".to_string()),
            };
        }

        let report = self.health().await;
        let failing: Vec<&str> = report
            .components
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();

        if failing.is_empty() {
            Readiness {
                ready: true,
                reason: None,
            }
        } else {
            Readiness {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", failing.join(", "))),
            }
        }
    }
}
