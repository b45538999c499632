//! Simulated content-generation agents and a synthetic task feed

use crate::config::{PoolConfig, WorkerSpec};
use async_trait::async_trait;
use balancer_lib::{LoadBalancer, Task, Worker};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const SUBJECTS: [&str; 6] = ["math", "science", "history", "literature", "art", "geography"];
const TASK_TYPES: [&str; 4] = ["lesson_plan", "quiz", "explanation", "worksheet"];
const GRADE_LEVELS: std::ops::RangeInclusive<u32> = 1..=12;

/// Share of synthetic tasks sent without educational metadata
const PLAIN_TASK_RATIO: f64 = 0.1;

/// A pool member whose load is its in-flight share of capacity
#[derive(Debug)]
pub struct SimulatedWorker {
    spec: WorkerSpec,
    in_flight: AtomicU32,
    completed: AtomicU64,
}

/// Simulated result of one task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub latency: Duration,
    pub quality: f64,
    pub success: bool,
}

impl SimulatedWorker {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            in_flight: AtomicU32::new(0),
            completed: AtomicU64::new(0),
        }
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn utilization(&self) -> f64 {
        (f64::from(self.in_flight()) / f64::from(self.spec.capacity.max(1))).clamp(0.0, 1.0)
    }

    pub fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        // Never underflows: every finish pairs with an earlier begin
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Draw latency, quality and success for a task started at the current load
    ///
    /// Busier workers are slower, produce lower quality output and fail more
    /// often. Specialists gain a little quality on their own subjects.
    pub fn sample_outcome<R: Rng + ?Sized>(&self, task: &Task, rng: &mut R) -> Outcome {
        let load = self.utilization();
        let jitter = rng.gen_range(0.8..1.2);
        let latency_ms = self.spec.base_latency_ms as f64 * (1.0 + load) * jitter;

        let specialist = task
            .subject()
            .is_some_and(|s| self.spec.specializations.iter().any(|own| own == s));
        let bonus = if specialist { 0.05 } else { 0.0 };
        let quality =
            (self.spec.base_quality + bonus - 0.2 * load + rng.gen_range(-0.05..0.05)).clamp(0.0, 1.0);

        let success = rng.gen_bool((0.98 - 0.2 * load).clamp(0.5, 1.0));

        Outcome {
            latency: Duration::from_millis(latency_ms.round() as u64),
            quality,
            success,
        }
    }
}

#[async_trait]
impl Worker for SimulatedWorker {
    fn id(&self) -> &str {
        &self.spec.id
    }

    async fn load_factor(&self) -> f64 {
        self.utilization()
    }

    fn current_tasks(&self) -> Option<u32> {
        Some(self.in_flight())
    }

    fn specializations(&self) -> &[String] {
        &self.spec.specializations
    }
}

/// Build a random task, occasionally without educational metadata
pub fn random_task<R: Rng + ?Sized>(sequence: u64, rng: &mut R) -> Task {
    let task_type = TASK_TYPES.choose(rng).copied().unwrap_or("explanation");
    let task = Task::new(format!("task-{sequence:06}")).with_type(task_type);
    if rng.gen_bool(PLAIN_TASK_RATIO) {
        return task;
    }
    let subject = SUBJECTS.choose(rng).copied();
    let grade = rng.gen_range(GRADE_LEVELS);
    task.with_context(subject, Some(grade))
}

/// Register every pool member with the balancer
pub async fn register_pool(
    balancer: &LoadBalancer,
    pool: &PoolConfig,
) -> balancer_lib::Result<Vec<Arc<SimulatedWorker>>> {
    let mut workers = Vec::with_capacity(pool.workers.len());
    for spec in &pool.workers {
        let capabilities = BTreeMap::from([
            ("capacity".to_string(), f64::from(spec.capacity)),
            ("quality".to_string(), spec.base_quality),
        ]);
        balancer
            .register_worker(&spec.id, capabilities, spec.specializations.clone())
            .await?;
        workers.push(Arc::new(SimulatedWorker::new(spec.clone())));
    }
    Ok(workers)
}

/// Feeds synthetic tasks to the balancer and reports simulated outcomes
pub struct TaskDriver {
    balancer: Arc<LoadBalancer>,
    workers: Vec<Arc<SimulatedWorker>>,
    interval: Duration,
    batch_mode: bool,
    sequence: u64,
    in_flight: JoinSet<()>,
}

impl TaskDriver {
    pub fn new(balancer: Arc<LoadBalancer>, workers: Vec<Arc<SimulatedWorker>>, pool: &PoolConfig) -> Self {
        Self {
            balancer,
            workers,
            interval: Duration::from_millis(pool.task_interval_ms),
            batch_mode: pool.batch_mode,
            sequence: 0,
            in_flight: JoinSet::new(),
        }
    }

    /// Run until a shutdown signal arrives, then wait out in-flight tasks
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            workers = self.workers.len(),
            interval_ms = self.interval.as_millis() as u64,
            batch_mode = self.batch_mode,
            "Starting task driver"
        );
        if self.batch_mode {
            self.balancer.enable_batch_mode().await;
        }

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Task completion ended abnormally");
                    }
                }
                _ = shutdown.recv() => {
                    info!(
                        submitted = self.sequence,
                        in_flight = self.in_flight.len(),
                        "Stopping task driver"
                    );
                    self.drain().await;
                    break;
                }
            }
        }
    }

    /// Submit one task, dispatching whatever is due
    pub async fn tick(&mut self) {
        self.sequence += 1;
        let task = random_task(self.sequence, &mut rand::thread_rng());

        if !self.batch_mode {
            self.dispatch(task).await;
            return;
        }

        if let Err(e) = self.balancer.submit_batch_task(task).await {
            warn!(error = %e, "Batch submission rejected");
            return;
        }
        for task in self.balancer.take_batch().await {
            self.dispatch(task).await;
        }
    }

    /// Select a worker for `task` and complete it in the background;
    /// returns false when no worker was available
    pub async fn dispatch(&mut self, task: Task) -> bool {
        let Some(worker) = self.balancer.select_worker(&self.workers, Some(&task)).await else {
            warn!(task_id = %task.task_id, "No worker available");
            return false;
        };

        let outcome = worker.sample_outcome(&task, &mut rand::thread_rng());
        worker.begin();
        debug!(
            task_id = %task.task_id,
            worker_id = %worker.id(),
            latency_ms = outcome.latency.as_millis() as u64,
            "Dispatched task"
        );

        let balancer = Arc::clone(&self.balancer);
        self.in_flight.spawn(async move {
            tokio::time::sleep(outcome.latency).await;
            worker.finish();
            balancer
                .update_worker_performance(
                    worker.id(),
                    outcome.latency.as_secs_f64(),
                    outcome.quality,
                    outcome.success,
                )
                .await;
        });
        true
    }

    /// Tasks dispatched but not yet reported
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for every dispatched task to report its outcome
    pub async fn drain(&mut self) {
        while let Some(result) = self.in_flight.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Task completion ended abnormally");
            }
        }
    }
}
