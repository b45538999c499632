//! Background monitoring, rebalancing and prediction loops

use super::state::choose_adaptive_strategy;
use super::LoadBalancer;
use crate::alerts::BottleneckAlert;
use crate::config::Strategy;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::predictor::{forecast_capacity, FORECAST_PERIODS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Run `cycle` every `interval` until a shutdown signal arrives
///
/// Failures are logged and reported to the health registry; the loop always
/// waits a full interval before the next attempt.
async fn run_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    health: HealthRegistry,
    mut shutdown: broadcast::Receiver<()>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(
        component = name,
        interval_secs = interval.as_secs(),
        "Starting background loop"
    );

    loop {
        match cycle().await {
            Ok(()) => health.record_success(name).await,
            Err(e) => {
                warn!(component = name, error = %e, "Background cycle failed");
                health.record_failure(name, e.to_string()).await;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => {
                info!(component = name, "Stopping background loop");
                break;
            }
        }
    }
}

impl LoadBalancer {
    pub(super) async fn spawn_loops(
        self: &Arc<Self>,
        shutdown_tx: &broadcast::Sender<()>,
        predictive: bool,
    ) -> Vec<JoinHandle<()>> {
        let (monitor_every, rebalance_every, predict_every) = {
            let config = self.config.read().await;
            (
                config.metrics_collection_interval(),
                config.rebalancing_interval(),
                config.prediction_interval(),
            )
        };

        let mut handles = Vec::with_capacity(3);

        self.health.register(components::MONITOR).await;
        let this = Arc::clone(self);
        handles.push(tokio::spawn(run_periodic(
            components::MONITOR,
            monitor_every,
            self.health.clone(),
            shutdown_tx.subscribe(),
            move || {
                let this = Arc::clone(&this);
                async move { this.run_monitoring_cycle().await }
            },
        )));

        self.health.register(components::REBALANCER).await;
        let this = Arc::clone(self);
        handles.push(tokio::spawn(run_periodic(
            components::REBALANCER,
            rebalance_every,
            self.health.clone(),
            shutdown_tx.subscribe(),
            move || {
                let this = Arc::clone(&this);
                async move {
                    this.run_rebalancing_cycle().await;
                    Ok(())
                }
            },
        )));

        if predictive {
            self.health.register(components::FORECASTER).await;
            let this = Arc::clone(self);
            handles.push(tokio::spawn(run_periodic(
                components::FORECASTER,
                predict_every,
                self.health.clone(),
                shutdown_tx.subscribe(),
                move || {
                    let this = Arc::clone(&this);
                    async move {
                        this.run_prediction_cycle().await;
                        Ok(())
                    }
                },
            )));
        }

        handles
    }

    /// Collect system metrics, refresh every worker's host figures, raise
    /// bottleneck alerts and refresh per-worker load predictions
    pub async fn run_monitoring_cycle(&self) -> Result<()> {
        let system = self.collect_system_metrics().await?;
        let config = self.config.read().await;

        let mut alerts: Vec<BottleneckAlert> = BottleneckAlert::from_metrics(None, &system)
            .into_iter()
            .collect();

        let mut state = self.state.lock().await;
        for (worker_id, worker_state) in state.worker_states.iter_mut() {
            worker_state
                .current_metrics
                .refresh_host(&system, &config.thresholds);
            if let Some(alert) =
                BottleneckAlert::from_metrics(Some(worker_id.as_str()), &worker_state.current_metrics)
            {
                alerts.push(alert);
            }
        }
        for alert in &alerts {
            state.push_alert(alert.clone());
        }
        if config.enable_predictive_scaling {
            state.refresh_load_predictions();
        }
        drop(state);

        for alert in &alerts {
            self.metrics.inc_bottleneck_alert(alert);
            self.logger.log_bottleneck(alert);
        }
        debug!(
            utilization = system.overall_utilization(),
            health_score = system.health_score(),
            alerts = alerts.len(),
            "Monitoring cycle complete"
        );
        Ok(())
    }

    /// Adjust weights when load is uneven, then let the adaptive policy pick
    /// a strategy; returns the strategy switched to, if any
    pub async fn run_rebalancing_cycle(&self) -> Option<Strategy> {
        let (adaptive, quality_optimization) = {
            let config = self.config.read().await;
            (
                config.enable_adaptive_strategy,
                config.enable_quality_optimization,
            )
        };

        let (stats, choice) = {
            let mut state = self.state.lock().await;
            if state.should_rebalance() {
                let variance = state.load_variance();
                let changed = state.rebalance_weights();
                self.metrics.inc_rebalances();
                self.logger.log_rebalance(variance, changed);
            }

            if !adaptive {
                return None;
            }
            let stats = state.recent_allocation_stats();
            (stats, choose_adaptive_strategy(stats, quality_optimization))
        };

        let target = choice?;
        let mut config = self.config.write().await;
        if config.strategy == target {
            return None;
        }
        let previous = config.strategy;
        config.strategy = target;
        drop(config);

        self.metrics.inc_strategy_switches();
        if let Some(stats) = stats {
            self.logger.log_strategy_switch(
                previous,
                target,
                stats.success_rate,
                stats.average_quality,
            );
        }
        Some(target)
    }

    /// Refresh the short-horizon capacity forecast and report content skew
    pub async fn run_prediction_cycle(&self) {
        let mut state = self.state.lock().await;
        let history: Vec<_> = state.system_history.iter().cloned().collect();
        state.capacity_forecast = forecast_capacity(&history, FORECAST_PERIODS);
        let skew = state.distribution_skew();
        let forecast = state.capacity_forecast.clone();
        drop(state);

        match forecast {
            Some(forecast) => debug!(
                cpu_percent = forecast.forecast.cpu_percent,
                memory_percent = forecast.forecast.memory_percent,
                tasks = forecast.forecast.tasks,
                samples = forecast.samples_used,
                "Capacity forecast refreshed"
            ),
            None => debug!("Not enough history for a capacity forecast"),
        }

        for report in skew {
            self.logger
                .log_distribution_skew(report.dimension, &report.key, report.count, report.mean);
        }
    }
}
