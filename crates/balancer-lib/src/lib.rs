//! Resource-aware load balancing for content-generation workers
//!
//! This crate provides:
//! - Resource and quality metrics with derived utilization, health and
//!   bottleneck indicators
//! - Per-worker tracked state with rolling performance history
//! - Eight worker selection strategies
//! - The [`LoadBalancer`] core with monitoring, rebalancing and prediction
//!   loops
//! - Trend-based capacity forecasting
//! - Health checks and observability

pub mod alerts;
pub mod balancer;
pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod strategy;
pub mod worker;

pub use alerts::{AlertScope, AlertSeverity, BottleneckAlert};
pub use balancer::{Lifecycle, LoadBalancer, LoadBalancingStatus};
pub use collector::{HostSample, MetricsSource, StaticMetricsSource, SystemMetricsSource};
pub use config::{BottleneckThresholds, LoadBalancingConfig, Strategy};
pub use error::{BalancerError, Result};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, Readiness};
pub use metrics::ResourceMetrics;
pub use models::*;
pub use observability::{BalancerMetrics, StructuredLogger};
pub use predictor::{ResourcePrediction, ScalingRecommendation};
pub use worker::{Worker, WorkerResourceState};
