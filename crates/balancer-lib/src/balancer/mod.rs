//! Load balancer core
//!
//! [`LoadBalancer`] owns all worker tracking state behind a single mutex and
//! the configuration behind a read-write lock. The configuration lock is
//! always taken before the state lock, and the state lock is never held
//! while awaiting a worker or the metrics source.

mod batch;
mod loops;
mod state;
mod status;

pub use state::{
    ADAPTATION_WINDOW, ALLOCATION_HIGH_WATER, ALLOCATION_RETAIN, MIN_ALLOCATIONS_FOR_ADAPTATION,
    SELECTION_HISTORY_CAP, SYSTEM_HISTORY_CAP,
};
pub use status::{BatchStatus, LoadBalancingStatus, SystemSummary, WorkerStatus};

use crate::collector::MetricsSource;
use crate::config::{LoadBalancingConfig, Strategy};
use crate::error::{BalancerError, Result};
use crate::health::HealthRegistry;
use crate::metrics::ResourceMetrics;
use crate::models::{AllocationRecord, SelectionRecord, Task};
use crate::observability::{BalancerMetrics, StructuredLogger};
use crate::predictor::{self, ResourcePrediction, PREDICTION_LOOKBACK};
use crate::strategy::{Candidate, SelectionContext};
use crate::worker::{Worker, WorkerResourceState};
use serde::{Deserialize, Serialize};
use state::BalancerState;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Balancer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Lifecycle {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Running,
            3 => Lifecycle::ShuttingDown,
            4 => Lifecycle::Stopped,
            _ => Lifecycle::Uninitialized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Running => "running",
            Lifecycle::ShuttingDown => "shutting_down",
            Lifecycle::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Background task bookkeeping
#[derive(Default)]
struct Runtime {
    shutdown_tx: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

pub struct LoadBalancer {
    config: RwLock<LoadBalancingConfig>,
    state: Mutex<BalancerState>,
    source: Arc<dyn MetricsSource>,
    lifecycle: AtomicU8,
    runtime: Mutex<Runtime>,
    health: HealthRegistry,
    metrics: BalancerMetrics,
    logger: StructuredLogger,
}

impl LoadBalancer {
    /// Create a balancer after validating `config`
    pub fn new(config: LoadBalancingConfig, source: Arc<dyn MetricsSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            state: Mutex::new(BalancerState::default()),
            source,
            lifecycle: AtomicU8::new(Lifecycle::Uninitialized as u8),
            runtime: Mutex::new(Runtime::default()),
            health: HealthRegistry::new(),
            metrics: BalancerMetrics::new(),
            logger: StructuredLogger::new("swarm-balancer"),
        })
    }

    /// Share an existing health registry, e.g. one served over HTTP
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(name);
        self
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        debug!(lifecycle = %lifecycle, "Lifecycle transition");
        self.lifecycle.store(lifecycle as u8, Ordering::SeqCst);
    }

    pub async fn config(&self) -> LoadBalancingConfig {
        self.config.read().await.clone()
    }

    pub async fn strategy(&self) -> Strategy {
        self.config.read().await.strategy
    }

    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.worker_states.len()
    }

    /// Take an initial system snapshot and start the background loops
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        let current = self.lifecycle();
        if current != Lifecycle::Uninitialized {
            return Err(BalancerError::AlreadyInitialized(current.to_string()));
        }
        self.set_lifecycle(Lifecycle::Initializing);

        if let Err(e) = self.collect_system_metrics().await {
            self.set_lifecycle(Lifecycle::Uninitialized);
            return Err(e);
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let predictive = self.config.read().await.enable_predictive_scaling;
        runtime.handles = self.spawn_loops(&shutdown_tx, predictive).await;
        runtime.shutdown_tx = Some(shutdown_tx);

        self.set_lifecycle(Lifecycle::Running);
        self.health.set_ready(true).await;
        self.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            self.strategy().await,
            self.worker_count().await,
        );
        Ok(())
    }

    /// Stop the background loops and drain queued batch tasks
    ///
    /// Returns the tasks that were still queued.
    pub async fn shutdown(&self) -> Result<Vec<Task>> {
        let mut runtime = self.runtime.lock().await;
        let current = self.lifecycle();
        if current != Lifecycle::Running {
            return Err(BalancerError::NotRunning(current.to_string()));
        }
        self.set_lifecycle(Lifecycle::ShuttingDown);
        self.health.set_ready(false).await;
        self.logger.log_shutdown("shutdown requested");

        if let Some(tx) = runtime.shutdown_tx.take() {
            // No receivers left only if every loop already exited
            let _ = tx.send(());
        }
        for handle in runtime.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }

        let drained = self.state.lock().await.batch.drain();
        if !drained.is_empty() {
            info!(tasks = drained.len(), "Drained pending batch tasks");
        }

        self.set_lifecycle(Lifecycle::Stopped);
        Ok(drained)
    }

    /// Track a worker, overwriting any previous state for the same id
    pub async fn register_worker(
        &self,
        worker_id: &str,
        capabilities: BTreeMap<String, f64>,
        specializations: Vec<String>,
    ) -> Result<()> {
        let sample = self
            .source
            .sample()
            .await
            .map_err(BalancerError::MetricsCollection)?;
        let thresholds = self.config.read().await.thresholds;
        let mut metrics = ResourceMetrics::from_host(&sample);
        metrics.recompute_derived_with(&thresholds);

        let worker_state = WorkerResourceState::new(worker_id, metrics, capabilities, specializations);
        let count = {
            let mut state = self.state.lock().await;
            state.register(worker_state);
            state.worker_states.len()
        };
        self.metrics.set_registered_workers(count);
        info!(worker_id = %worker_id, workers = count, "Registered worker");
        Ok(())
    }

    /// Stop tracking a worker; unknown ids are ignored
    pub async fn unregister_worker(&self, worker_id: &str) -> bool {
        let (removed, count) = {
            let mut state = self.state.lock().await;
            let removed = state.unregister(worker_id);
            (removed, state.worker_states.len())
        };
        if removed {
            self.metrics.set_registered_workers(count);
            info!(worker_id = %worker_id, workers = count, "Unregistered worker");
        }
        removed
    }

    /// Choose one of `workers` for `task` under the active strategy
    pub async fn select_worker<W>(&self, workers: &[Arc<W>], task: Option<&Task>) -> Option<Arc<W>>
    where
        W: Worker + ?Sized,
    {
        let first = workers.first()?;
        let started = Instant::now();
        let (strategy, thresholds, track_content) = {
            let config = self.config.read().await;
            (
                config.strategy,
                config.thresholds,
                config.track_content_distribution,
            )
        };

        if workers.len() == 1 {
            self.state
                .lock()
                .await
                .record_selection(first.id(), strategy, task, 1, track_content);
            self.metrics
                .observe_selection(strategy, started.elapsed().as_secs_f64());
            return Some(Arc::clone(first));
        }

        let mut live = Vec::with_capacity(workers.len());
        for worker in workers {
            live.push((worker.load_factor().await, worker.current_tasks()));
        }

        // Worker reads are done; the selector still needs the full config
        let config = self.config.read().await;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        for (worker, (load, tasks)) in workers.iter().zip(&live) {
            if let Some(worker_state) = state.worker_states.get_mut(worker.id()) {
                worker_state.refresh_live(*load, *tasks, &thresholds);
            }
        }

        let candidates: Vec<Candidate<'_>> = workers
            .iter()
            .zip(&live)
            .map(|(worker, (_, tasks))| Candidate {
                id: worker.id(),
                current_tasks: *tasks,
                specializations: worker.specializations(),
            })
            .collect();

        let index = {
            let mut ctx = SelectionContext {
                config: &config,
                worker_states: &state.worker_states,
                weights: &state.weights,
                system_metrics: state.system_history.back(),
                grade_level_distribution: &state.grade_distribution,
                cursors: &mut state.cursors,
            };
            strategy.selector().select(&mut ctx, &candidates, task)
        };
        let chosen = &workers[index];

        state.record_selection(chosen.id(), strategy, task, workers.len(), track_content);
        drop(guard);
        drop(config);

        self.metrics
            .observe_selection(strategy, started.elapsed().as_secs_f64());
        self.logger.log_selection(
            chosen.id(),
            strategy,
            workers.len(),
            task.and_then(|t| t.task_type.as_deref()),
        );
        Some(Arc::clone(chosen))
    }

    /// Fold a completed task into the worker's history and weight
    pub async fn update_worker_performance(
        &self,
        worker_id: &str,
        duration_secs: f64,
        quality: f64,
        success: bool,
    ) {
        let thresholds = self.config.read().await.thresholds;
        let mut state = self.state.lock().await;

        let Some(worker_state) = state.worker_states.get_mut(worker_id) else {
            debug!(worker_id = %worker_id, "Performance update for untracked worker");
            return;
        };
        worker_state.update_performance_history(duration_secs, quality);
        worker_state.record_outcome(success, &thresholds);

        let weight = state.adjust_weight(worker_id, success, quality);
        state.record_allocation(worker_id, duration_secs, quality, success);
        debug!(
            worker_id = %worker_id,
            duration_secs = duration_secs,
            quality = quality,
            success = success,
            weight = weight,
            "Recorded task outcome"
        );
    }

    /// Project resource needs `horizon_minutes` ahead
    pub async fn predict_resource_needs(&self, horizon_minutes: u32) -> Result<ResourcePrediction> {
        let state = self.state.lock().await;
        let skip = state.system_history.len().saturating_sub(PREDICTION_LOOKBACK);
        let recent: Vec<ResourceMetrics> = state.system_history.iter().skip(skip).cloned().collect();
        drop(state);
        predictor::predict_resource_needs(&recent, horizon_minutes)
    }

    /// Latest system snapshot, or an empty one before the first collection
    pub async fn get_metrics(&self) -> ResourceMetrics {
        self.state
            .lock()
            .await
            .current_system()
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_worker_metrics(&self, worker_id: &str) -> Option<ResourceMetrics> {
        self.state
            .lock()
            .await
            .worker_states
            .get(worker_id)
            .map(|s| s.current_metrics.clone())
    }

    pub async fn get_worker_state(&self, worker_id: &str) -> Option<WorkerResourceState> {
        self.state.lock().await.worker_states.get(worker_id).cloned()
    }

    pub async fn get_load_balancing_status(&self) -> LoadBalancingStatus {
        let config = self.config.read().await;
        let state = self.state.lock().await;
        LoadBalancingStatus::capture(&state, self.lifecycle(), config.strategy, config.batch_size)
    }

    pub async fn selection_history(&self) -> Vec<SelectionRecord> {
        self.state.lock().await.selection_history.iter().cloned().collect()
    }

    pub async fn allocation_count(&self) -> usize {
        self.state.lock().await.allocation_history.len()
    }

    pub async fn recent_allocations(&self, limit: usize) -> Vec<AllocationRecord> {
        let state = self.state.lock().await;
        let skip = state.allocation_history.len().saturating_sub(limit);
        state.allocation_history.iter().skip(skip).cloned().collect()
    }

    pub async fn enable_batch_mode(&self) {
        self.state.lock().await.batch.enable();
        info!("Batch mode enabled");
    }

    /// Turn batch mode off, returning any tasks still queued
    pub async fn disable_batch_mode(&self) -> Vec<Task> {
        let drained = self.state.lock().await.batch.disable();
        info!(drained = drained.len(), "Batch mode disabled");
        drained
    }

    pub async fn is_batch_mode(&self) -> bool {
        self.state.lock().await.batch.is_enabled()
    }

    /// Queue a task for batched dispatch; returns whether a full batch is ready
    pub async fn submit_batch_task(&self, task: Task) -> Result<bool> {
        let batch_size = self.config.read().await.batch_size;
        self.state
            .lock()
            .await
            .batch
            .push(task, batch_size, Instant::now())
    }

    /// Remove the next due batch, if any
    pub async fn take_batch(&self) -> Vec<Task> {
        let (batch_size, timeout) = {
            let config = self.config.read().await;
            (config.batch_size, config.batch_timeout())
        };
        self.state
            .lock()
            .await
            .batch
            .take(batch_size, timeout, Instant::now())
    }

    /// Sample the host, fold in task state and append to the system history
    pub(crate) async fn collect_system_metrics(&self) -> Result<ResourceMetrics> {
        let started = Instant::now();
        let sample = match self.source.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                self.metrics.inc_collection_errors();
                return Err(BalancerError::MetricsCollection(e));
            }
        };
        self.metrics
            .observe_collection_latency(started.elapsed().as_secs_f64());

        let thresholds = self.config.read().await.thresholds;
        let mut metrics = ResourceMetrics::from_host(&sample);

        let mut state = self.state.lock().await;
        state.aggregate_task_metrics(&mut metrics);
        metrics.recompute_derived_with(&thresholds);
        state.push_system_metrics(metrics.clone());
        drop(state);

        self.metrics
            .set_system_state(metrics.overall_utilization(), metrics.health_score());
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests;
