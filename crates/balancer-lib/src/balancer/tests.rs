use super::*;
use crate::collector::{async_trait, HostSample, StaticMetricsSource};
use crate::health::{components, ComponentStatus};
use crate::predictor::ScalingRecommendation;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_test::assert_ok;

struct TestWorker {
    id: String,
    load_bits: AtomicU64,
    tasks: Option<u32>,
    specializations: Vec<String>,
}

impl TestWorker {
    fn new(id: &str, load: f64) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            load_bits: AtomicU64::new(load.to_bits()),
            tasks: None,
            specializations: Vec::new(),
        })
    }

    fn with_specializations(id: &str, load: f64, specializations: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            load_bits: AtomicU64::new(load.to_bits()),
            tasks: Some(0),
            specializations: specializations.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl Worker for TestWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_factor(&self) -> f64 {
        f64::from_bits(self.load_bits.load(Ordering::SeqCst))
    }

    fn current_tasks(&self) -> Option<u32> {
        self.tasks
    }

    fn specializations(&self) -> &[String] {
        &self.specializations
    }
}

/// Worker whose load report waits until the gate has a permit
struct GatedWorker {
    id: String,
    gate: Arc<Semaphore>,
}

impl GatedWorker {
    fn new(id: &str, gate: &Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            gate: Arc::clone(gate),
        })
    }
}

#[async_trait]
impl Worker for GatedWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_factor(&self) -> f64 {
        let _permit = self.gate.acquire().await;
        0.5
    }

    fn current_tasks(&self) -> Option<u32> {
        None
    }

    fn specializations(&self) -> &[String] {
        &[]
    }
}

struct FailingSource;

#[async_trait]
impl MetricsSource for FailingSource {
    async fn sample(&self) -> anyhow::Result<HostSample> {
        anyhow::bail!("sensor offline")
    }
}

fn host(cpu: f64, memory: f64) -> HostSample {
    HostSample {
        cpu_percent: cpu,
        memory_percent: memory,
        ..Default::default()
    }
}

fn balancer_with(config: LoadBalancingConfig) -> (Arc<LoadBalancer>, Arc<StaticMetricsSource>) {
    let source = Arc::new(StaticMetricsSource::new(host(20.0, 30.0)));
    let balancer = LoadBalancer::new(config, source.clone()).unwrap();
    (Arc::new(balancer), source)
}

fn balancer(strategy: Strategy) -> Arc<LoadBalancer> {
    balancer_with(LoadBalancingConfig::with_strategy(strategy)).0
}

async fn register(lb: &LoadBalancer, ids: &[&str]) {
    for id in ids {
        lb.register_worker(id, BTreeMap::new(), Vec::new())
            .await
            .unwrap();
    }
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = LoadBalancingConfig::default();
    config.batch_size = 0;
    let source = Arc::new(StaticMetricsSource::default());
    assert!(matches!(
        LoadBalancer::new(config, source),
        Err(BalancerError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_select_from_empty_pool() {
    let lb = balancer(Strategy::RoundRobin);
    let workers: Vec<Arc<TestWorker>> = Vec::new();
    assert!(lb.select_worker(&workers, None).await.is_none());
    assert!(lb.selection_history().await.is_empty());
}

#[tokio::test]
async fn test_single_worker_is_recorded() {
    let lb = balancer(Strategy::ResourceAware);
    let workers = vec![TestWorker::new("only", 0.5)];

    let chosen = lb.select_worker(&workers, None).await.unwrap();
    assert_eq!(chosen.id(), "only");

    let history = lb.selection_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].worker_id, "only");
    assert_eq!(history[0].candidates, 1);
}

#[tokio::test]
async fn test_round_robin_over_trait_objects() {
    let lb = balancer(Strategy::RoundRobin);
    register(&lb, &["a", "b", "c"]).await;
    let workers: Vec<Arc<dyn Worker>> = vec![
        TestWorker::new("a", 0.1),
        TestWorker::new("b", 0.1),
        TestWorker::new("c", 0.1),
    ];

    let mut picks = Vec::new();
    for _ in 0..3 {
        let chosen = lb.select_worker(&workers, None).await.unwrap();
        picks.push(chosen.id().to_string());
    }
    picks.sort();
    assert_eq!(picks, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_unregistered_workers_are_still_selectable() {
    let lb = balancer(Strategy::ResourceAware);
    let workers = vec![TestWorker::new("x", 0.3), TestWorker::new("y", 0.1)];
    let chosen = lb.select_worker(&workers, None).await.unwrap();
    assert_eq!(chosen.id(), "x");
}

#[tokio::test]
async fn test_selection_refreshes_live_load() {
    let lb = balancer(Strategy::QualityAware);
    register(&lb, &["a", "b"]).await;
    let workers = vec![TestWorker::new("a", 0.7), TestWorker::new("b", 0.2)];
    lb.select_worker(&workers, None).await.unwrap();

    let state = lb.get_worker_state("a").await.unwrap();
    assert_eq!(state.load_factor, 0.7);
    assert_eq!(state.load_history.len(), 1);
}

#[tokio::test]
async fn test_educational_selection_tracks_distribution() {
    let lb = balancer(Strategy::EducationalOptimized);
    register(&lb, &["general", "math"]).await;
    let workers = vec![
        TestWorker::with_specializations("general", 0.1, &[]),
        TestWorker::with_specializations("math", 0.1, &["math"]),
    ];

    let task = Task::new("t1").with_context(Some("math"), Some(8));
    let chosen = lb.select_worker(&workers, Some(&task)).await.unwrap();
    assert_eq!(chosen.id(), "math");

    let status = lb.get_load_balancing_status().await;
    assert_eq!(status.subject_distribution["math"], 1);
    assert_eq!(status.grade_level_distribution[&8], 1);
}

#[tokio::test]
async fn test_register_twice_keeps_one_entry() {
    let lb = balancer(Strategy::Adaptive);
    register(&lb, &["dup"]).await;
    lb.update_worker_performance("dup", 1.0, 0.9, true).await;
    register(&lb, &["dup"]).await;

    assert_eq!(lb.worker_count().await, 1);
    let state = lb.get_worker_state("dup").await.unwrap();
    assert!(state.performance_history.is_empty());
}

#[tokio::test]
async fn test_register_propagates_source_failure() {
    let lb = LoadBalancer::new(LoadBalancingConfig::default(), Arc::new(FailingSource)).unwrap();
    let err = lb
        .register_worker("a", BTreeMap::new(), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BalancerError::MetricsCollection(_)));
    assert_eq!(lb.worker_count().await, 0);
}

#[tokio::test]
async fn test_unregister_unknown_is_silent() {
    let lb = balancer(Strategy::Adaptive);
    assert!(!lb.unregister_worker("ghost").await);
    register(&lb, &["a"]).await;
    assert!(lb.unregister_worker("a").await);
    assert!(lb.get_worker_metrics("a").await.is_none());
}

#[tokio::test]
async fn test_performance_updates_weight_and_history() {
    let lb = balancer(Strategy::WeightedRoundRobin);
    register(&lb, &["a"]).await;

    for _ in 0..3 {
        lb.update_worker_performance("a", 2.0, 0.95, true).await;
    }
    let status = lb.get_load_balancing_status().await;
    assert_eq!(status.workers["a"].weight, 4);
    assert!((status.workers["a"].predicted_quality_score - 0.95).abs() < 1e-9);

    for _ in 0..10 {
        lb.update_worker_performance("a", 2.0, 0.1, false).await;
    }
    let status = lb.get_load_balancing_status().await;
    assert_eq!(status.workers["a"].weight, 1);

    let metrics = lb.get_worker_metrics("a").await.unwrap();
    assert_eq!(metrics.completed_tasks, 3);
    assert_eq!(metrics.failed_tasks, 10);
    assert_eq!(lb.allocation_count().await, 13);
}

#[tokio::test]
async fn test_performance_update_for_unknown_worker_is_ignored() {
    let lb = balancer(Strategy::Adaptive);
    lb.update_worker_performance("ghost", 1.0, 0.9, true).await;
    assert_eq!(lb.allocation_count().await, 0);
}

#[tokio::test]
async fn test_allocation_history_trimmed() {
    let lb = balancer(Strategy::Adaptive);
    register(&lb, &["a"]).await;
    for _ in 0..=ALLOCATION_HIGH_WATER {
        lb.update_worker_performance("a", 1.0, 0.7, true).await;
    }
    assert_eq!(lb.allocation_count().await, ALLOCATION_RETAIN);
}

#[tokio::test]
async fn test_lifecycle_and_clean_shutdown() {
    let lb = balancer(Strategy::Adaptive);
    assert_eq!(lb.lifecycle(), Lifecycle::Uninitialized);

    assert_ok!(lb.initialize().await);
    assert_eq!(lb.lifecycle(), Lifecycle::Running);
    assert!(lb.health().readiness().await.ready);
    assert!(matches!(
        lb.initialize().await,
        Err(BalancerError::AlreadyInitialized(_))
    ));

    lb.enable_batch_mode().await;
    assert_ok!(lb.submit_batch_task(Task::new("queued")).await);

    let drained = tokio::time::timeout(Duration::from_secs(5), lb.shutdown())
        .await
        .expect("shutdown should not hang")
        .unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(lb.lifecycle(), Lifecycle::Stopped);
    assert!(!lb.health().readiness().await.ready);

    assert!(matches!(
        lb.shutdown().await,
        Err(BalancerError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_initialize_failure_rolls_back() {
    let lb = Arc::new(
        LoadBalancer::new(LoadBalancingConfig::default(), Arc::new(FailingSource)).unwrap(),
    );
    assert!(matches!(
        lb.initialize().await,
        Err(BalancerError::MetricsCollection(_))
    ));
    assert_eq!(lb.lifecycle(), Lifecycle::Uninitialized);
}

#[tokio::test]
async fn test_background_loops_report_health() {
    let lb = balancer(Strategy::Adaptive);
    lb.initialize().await.unwrap();

    // The first cycle of every loop runs immediately
    tokio::time::sleep(Duration::from_millis(200)).await;
    let report = lb.health().health().await;
    for name in [components::MONITOR, components::REBALANCER, components::FORECASTER] {
        assert_eq!(report.components[name].status, ComponentStatus::Healthy);
    }

    lb.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_monitoring_cycle_raises_alerts() {
    let (lb, source) = balancer_with(LoadBalancingConfig::default());
    register(&lb, &["a"]).await;
    source.set(host(97.0, 92.0));

    lb.run_monitoring_cycle().await.unwrap();

    let status = lb.get_load_balancing_status().await;
    let system = status.system.unwrap();
    assert_eq!(system.bottlenecks.len(), 2);
    assert!(status
        .recent_alerts
        .iter()
        .any(|a| a.scope == crate::alerts::AlertScope::System));
}

#[tokio::test]
async fn test_monitoring_cycle_refreshes_worker_host_figures() {
    let (lb, source) = balancer_with(LoadBalancingConfig::default());
    source.set(host(95.0, 30.0));
    register(&lb, &["w1", "w2"]).await;
    assert!(lb.get_worker_metrics("w1").await.unwrap().has_bottlenecks());

    source.set(host(10.0, 30.0));
    let workers = vec![TestWorker::new("w1", 0.2), TestWorker::new("w2", 0.3)];
    for _ in 0..3 {
        lb.select_worker(&workers, None).await.unwrap();
        lb.run_monitoring_cycle().await.unwrap();
    }

    let w1 = lb.get_worker_metrics("w1").await.unwrap();
    assert_eq!(w1.cpu_percent, 10.0);
    assert!(w1.bottleneck_indicators().is_empty());

    let status = lb.get_load_balancing_status().await;
    assert!(status
        .recent_alerts
        .iter()
        .all(|a| a.scope != crate::alerts::AlertScope::Worker));
}

#[tokio::test]
async fn test_config_writable_while_workers_report_load() {
    let lb = balancer(Strategy::LeastConnections);
    register(&lb, &["g1", "g2"]).await;

    let gate = Arc::new(Semaphore::new(0));
    let workers = vec![GatedWorker::new("g1", &gate), GatedWorker::new("g2", &gate)];
    let selecting = tokio::spawn({
        let lb = Arc::clone(&lb);
        async move {
            lb.select_worker(&workers, None)
                .await
                .map(|w| w.id().to_string())
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!selecting.is_finished());

    let write = tokio::time::timeout(Duration::from_millis(200), lb.config.write()).await;
    assert!(write.is_ok(), "config write blocked behind a pending load report");
    drop(write);

    gate.add_permits(1);
    let chosen = selecting.await.unwrap();
    assert!(chosen.is_some());
    assert_eq!(lb.selection_history().await.len(), 1);
}

#[tokio::test]
async fn test_predict_requires_history() {
    let (lb, source) = balancer_with(LoadBalancingConfig::default());
    for _ in 0..4 {
        lb.collect_system_metrics().await.unwrap();
    }
    assert!(matches!(
        lb.predict_resource_needs(60).await,
        Err(BalancerError::InsufficientHistory {
            available: 4,
            required: 5
        })
    ));

    for cpu in [50.0, 55.0, 60.0, 65.0, 70.0] {
        source.set(host(cpu, 30.0));
        lb.collect_system_metrics().await.unwrap();
    }
    let prediction = lb.predict_resource_needs(60).await.unwrap();
    assert!(prediction.trends.cpu_percent > 0.0);
    assert_eq!(prediction.recommendation, ScalingRecommendation::ScaleUp);
}

#[tokio::test]
async fn test_adaptive_switch_after_failures() {
    let lb = balancer(Strategy::Adaptive);
    register(&lb, &["a"]).await;

    for _ in 0..(MIN_ALLOCATIONS_FOR_ADAPTATION - 1) {
        lb.update_worker_performance("a", 1.0, 0.2, false).await;
    }
    assert_eq!(lb.run_rebalancing_cycle().await, None);
    assert_eq!(lb.strategy().await, Strategy::Adaptive);

    lb.update_worker_performance("a", 1.0, 0.2, false).await;
    assert_eq!(
        lb.run_rebalancing_cycle().await,
        Some(Strategy::ResourceAware)
    );
    assert_eq!(lb.strategy().await, Strategy::ResourceAware);

    // Same conclusion on the next pass is not a switch
    assert_eq!(lb.run_rebalancing_cycle().await, None);
}

#[tokio::test]
async fn test_adaptive_switch_disabled() {
    let mut config = LoadBalancingConfig::with_strategy(Strategy::RoundRobin);
    config.enable_adaptive_strategy = false;
    let (lb, _) = balancer_with(config);
    register(&lb, &["a"]).await;
    for _ in 0..20 {
        lb.update_worker_performance("a", 1.0, 0.2, false).await;
    }
    assert_eq!(lb.run_rebalancing_cycle().await, None);
    assert_eq!(lb.strategy().await, Strategy::RoundRobin);
}

#[tokio::test]
async fn test_prediction_cycle_stores_forecast() {
    let lb = balancer(Strategy::Adaptive);
    for _ in 0..5 {
        lb.collect_system_metrics().await.unwrap();
    }
    lb.run_prediction_cycle().await;
    let status = lb.get_load_balancing_status().await;
    let forecast = status.capacity_forecast.unwrap();
    assert_eq!(forecast.samples_used, 5);
    assert!((forecast.forecast.cpu_percent - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_batch_mode_roundtrip() {
    let mut config = LoadBalancingConfig::default();
    config.batch_size = 2;
    let (lb, _) = balancer_with(config);

    assert!(matches!(
        lb.submit_batch_task(Task::new("early")).await,
        Err(BalancerError::BatchModeDisabled)
    ));

    lb.enable_batch_mode().await;
    assert!(!lb.submit_batch_task(Task::new("t1")).await.unwrap());
    assert!(lb.submit_batch_task(Task::new("t2")).await.unwrap());
    lb.submit_batch_task(Task::new("t3")).await.unwrap();

    assert_eq!(lb.take_batch().await.len(), 2);
    assert!(lb.take_batch().await.is_empty());

    let drained = lb.disable_batch_mode().await;
    assert_eq!(drained[0].task_id, "t3");
    assert!(!lb.is_batch_mode().await);
}

#[tokio::test]
async fn test_get_metrics_before_and_after_collection() {
    let lb = balancer(Strategy::Adaptive);
    assert_eq!(lb.get_metrics().await.cpu_percent, 0.0);

    lb.collect_system_metrics().await.unwrap();
    let metrics = lb.get_metrics().await;
    assert_eq!(metrics.cpu_percent, 20.0);
    assert!(metrics.overall_utilization() > 0.0);
}
