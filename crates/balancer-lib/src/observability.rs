//! Prometheus metrics and event logging for the load balancer

use crate::alerts::{AlertSeverity, BottleneckAlert};
use crate::config::Strategy;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Latency buckets in seconds
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0,
];

static GLOBAL_METRICS: OnceLock<BalancerMetricsInner> = OnceLock::new();

struct BalancerMetricsInner {
    selection_latency_seconds: Histogram,
    selections: IntCounterVec,
    registered_workers: IntGauge,
    system_utilization: Gauge,
    system_health: Gauge,
    bottleneck_alerts: IntCounterVec,
    rebalances: IntCounter,
    strategy_switches: IntCounter,
    collection_errors: IntCounter,
    collection_latency_seconds: Histogram,
}

impl BalancerMetricsInner {
    fn new() -> Self {
        Self {
            selection_latency_seconds: register_histogram!(
                "swarm_lb_selection_latency_seconds",
                "Time spent choosing a worker",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register selection_latency_seconds"),

            selections: register_int_counter_vec!(
                "swarm_lb_selections_total",
                "Worker selections by configured strategy",
                &["strategy"]
            )
            .expect("Failed to register selections_total"),

            registered_workers: register_int_gauge!(
                "swarm_lb_registered_workers",
                "Workers currently tracked by the balancer"
            )
            .expect("Failed to register registered_workers"),

            system_utilization: register_gauge!(
                "swarm_lb_system_utilization",
                "Latest system-wide overall utilization (0-1)"
            )
            .expect("Failed to register system_utilization"),

            system_health: register_gauge!(
                "swarm_lb_system_health_score",
                "Latest system-wide health score (0-1)"
            )
            .expect("Failed to register system_health_score"),

            bottleneck_alerts: register_int_counter_vec!(
                "swarm_lb_bottleneck_alerts_total",
                "Bottleneck alerts raised",
                &["scope", "severity"]
            )
            .expect("Failed to register bottleneck_alerts_total"),

            rebalances: register_int_counter!(
                "swarm_lb_rebalances_total",
                "Weight rebalancing passes applied"
            )
            .expect("Failed to register rebalances_total"),

            strategy_switches: register_int_counter!(
                "swarm_lb_strategy_switches_total",
                "Adaptive strategy changes"
            )
            .expect("Failed to register strategy_switches_total"),

            collection_errors: register_int_counter!(
                "swarm_lb_collection_errors_total",
                "Failed system metric collections"
            )
            .expect("Failed to register collection_errors_total"),

            collection_latency_seconds: register_histogram!(
                "swarm_lb_collection_latency_seconds",
                "Time spent collecting system metrics",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),
        }
    }
}

/// Handle to the process-wide balancer metrics
///
/// Clones share the same registered collectors.
#[derive(Clone)]
pub struct BalancerMetrics {
    _private: (),
}

impl Default for BalancerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BalancerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BalancerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BalancerMetricsInner {
        GLOBAL_METRICS.get_or_init(BalancerMetricsInner::new)
    }

    pub fn observe_selection(&self, strategy: Strategy, duration_secs: f64) {
        let inner = self.inner();
        inner.selection_latency_seconds.observe(duration_secs);
        inner
            .selections
            .with_label_values(&[strategy.as_str()])
            .inc();
    }

    pub fn set_registered_workers(&self, count: usize) {
        self.inner().registered_workers.set(count as i64);
    }

    pub fn set_system_state(&self, utilization: f64, health: f64) {
        self.inner().system_utilization.set(utilization);
        self.inner().system_health.set(health);
    }

    pub fn inc_bottleneck_alert(&self, alert: &BottleneckAlert) {
        let scope = alert.scope.to_string();
        let severity = alert.severity.to_string();
        self.inner()
            .bottleneck_alerts
            .with_label_values(&[scope.as_str(), severity.as_str()])
            .inc();
    }

    pub fn inc_rebalances(&self) {
        self.inner().rebalances.inc();
    }

    pub fn inc_strategy_switches(&self) {
        self.inner().strategy_switches.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }
}

/// Emits event-tagged log records for balancer decisions
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_selection(
        &self,
        worker_id: &str,
        strategy: Strategy,
        candidates: usize,
        task_type: Option<&str>,
    ) {
        debug!(
            event = "worker_selected",
            service = %self.service,
            worker_id = %worker_id,
            strategy = %strategy,
            candidates = candidates,
            task_type = ?task_type,
            "Worker selected"
        );
    }

    pub fn log_strategy_switch(
        &self,
        from: Strategy,
        to: Strategy,
        success_rate: f64,
        average_quality: f64,
    ) {
        info!(
            event = "strategy_switched",
            service = %self.service,
            from = %from,
            to = %to,
            success_rate = success_rate,
            average_quality = average_quality,
            "Load balancing strategy switched"
        );
    }

    pub fn log_bottleneck(&self, alert: &BottleneckAlert) {
        let indicators = alert.indicators.join("; ");
        match alert.severity {
            AlertSeverity::Critical => warn!(
                event = "bottleneck_detected",
                service = %self.service,
                source = %alert.source(),
                severity = %alert.severity,
                utilization = alert.overall_utilization,
                health_score = alert.health_score,
                indicators = %indicators,
                "Critical bottleneck detected"
            ),
            AlertSeverity::Warning => info!(
                event = "bottleneck_detected",
                service = %self.service,
                source = %alert.source(),
                severity = %alert.severity,
                utilization = alert.overall_utilization,
                health_score = alert.health_score,
                indicators = %indicators,
                "Bottleneck detected"
            ),
        }
    }

    pub fn log_rebalance(&self, load_variance: f64, weights_changed: usize) {
        info!(
            event = "rebalanced",
            service = %self.service,
            load_variance = load_variance,
            weights_changed = weights_changed,
            "Rebalanced worker weights"
        );
    }

    pub fn log_distribution_skew(&self, dimension: &str, key: &str, count: u64, mean: f64) {
        warn!(
            event = "distribution_skew",
            service = %self.service,
            dimension = %dimension,
            key = %key,
            count = count,
            mean = mean,
            "Content distribution is skewed"
        );
    }

    pub fn log_startup(&self, version: &str, strategy: Strategy, workers: usize) {
        info!(
            event = "balancer_started",
            service = %self.service,
            version = %version,
            strategy = %strategy,
            workers = workers,
            "Load balancer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "balancer_shutdown",
            service = %self.service,
            reason = %reason,
            "Load balancer shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ResourceMetrics;

    #[test]
    fn test_metrics_handle_records() {
        let metrics = BalancerMetrics::new();
        metrics.observe_selection(Strategy::RoundRobin, 0.0001);
        metrics.set_registered_workers(3);
        metrics.set_system_state(0.4, 0.9);
        metrics.inc_rebalances();
        metrics.inc_strategy_switches();
        metrics.inc_collection_errors();
        metrics.observe_collection_latency(0.1);

        let mut hot = ResourceMetrics::default();
        hot.cpu_percent = 99.0;
        hot.recompute_derived();
        if let Some(alert) = BottleneckAlert::from_metrics(None, &hot) {
            metrics.inc_bottleneck_alert(&alert);
        }

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "swarm_lb_selections_total"));
    }

    #[test]
    fn test_structured_logger_service() {
        let logger = StructuredLogger::new("swarm-balancer");
        assert_eq!(logger.service(), "swarm-balancer");
    }
}
