//! Resource and quality snapshots for workers and the whole system
//!
//! A [`ResourceMetrics`] carries raw counters plus three derived fields
//! (utilization, health and bottleneck indicators). The derived fields are
//! only ever written by [`ResourceMetrics::recompute_derived`], which every
//! constructor calls, so they are never observed stale.

use crate::collector::HostSample;
use crate::config::BottleneckThresholds;
use serde::Serialize;

/// Point-in-time resource snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_recv: u64,
    pub active_tasks: u32,
    pub queued_tasks: u32,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Mean task duration in seconds
    pub average_task_duration: f64,
    /// 0.0 - 1.0
    pub quality_score: f64,
    pub error_rate: f64,
    pub throughput_per_minute: f64,
    /// Seconds
    pub response_time: f64,
    pub content_generation_rate: f64,
    pub educational_alignment_score: f64,
    pub student_engagement_prediction: f64,

    overall_utilization: f64,
    health_score: f64,
    bottleneck_indicators: Vec<String>,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        let mut metrics = Self {
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            network_bytes_sent: 0,
            network_bytes_recv: 0,
            active_tasks: 0,
            queued_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            average_task_duration: 0.0,
            quality_score: 0.0,
            error_rate: 0.0,
            throughput_per_minute: 0.0,
            response_time: 0.0,
            content_generation_rate: 0.0,
            educational_alignment_score: 0.0,
            student_engagement_prediction: 0.0,
            overall_utilization: 0.0,
            health_score: 0.0,
            bottleneck_indicators: Vec::new(),
        };
        metrics.recompute_derived();
        metrics
    }
}

impl ResourceMetrics {
    /// Snapshot seeded from a host sample, task counters zeroed
    pub fn from_host(sample: &HostSample) -> Self {
        let mut metrics = Self {
            timestamp: sample.timestamp,
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            disk_percent: sample.disk_percent,
            network_bytes_sent: sample.network_bytes_sent,
            network_bytes_recv: sample.network_bytes_recv,
            ..Default::default()
        };
        metrics.recompute_derived();
        metrics
    }

    /// Take the host figures of a newer snapshot, keeping task counters
    pub fn refresh_host(&mut self, host: &ResourceMetrics, thresholds: &BottleneckThresholds) {
        self.timestamp = host.timestamp;
        self.cpu_percent = host.cpu_percent;
        self.memory_percent = host.memory_percent;
        self.disk_percent = host.disk_percent;
        self.network_bytes_sent = host.network_bytes_sent;
        self.network_bytes_recv = host.network_bytes_recv;
        self.recompute_derived_with(thresholds);
    }

    /// Recompute utilization, health and bottlenecks with default thresholds
    pub fn recompute_derived(&mut self) {
        self.recompute_derived_with(&BottleneckThresholds::default());
    }

    /// Recompute all derived fields together
    pub fn recompute_derived_with(&mut self, thresholds: &BottleneckThresholds) {
        self.overall_utilization = self.calculate_overall_utilization();
        self.health_score = self.calculate_health_score();
        self.detect_bottlenecks_with(thresholds);
    }

    pub fn overall_utilization(&self) -> f64 {
        self.overall_utilization
    }

    pub fn health_score(&self) -> f64 {
        self.health_score
    }

    pub fn bottleneck_indicators(&self) -> &[String] {
        &self.bottleneck_indicators
    }

    pub fn has_bottlenecks(&self) -> bool {
        !self.bottleneck_indicators.is_empty()
    }

    /// Weighted blend of CPU, memory and queue pressure, normalized to ~[0, 1]
    ///
    /// Queue pressure counts 10 points per active or queued task, capped at 100.
    pub fn calculate_overall_utilization(&self) -> f64 {
        let pending = f64::from(self.active_tasks) + f64::from(self.queued_tasks);
        let task_utilization = (pending * 10.0).min(100.0);
        (0.4 * self.cpu_percent + 0.3 * self.memory_percent + 0.3 * task_utilization) / 100.0
    }

    /// Unweighted mean of four bucketed quality-of-service factors
    pub fn calculate_health_score(&self) -> f64 {
        let cpu_factor = if self.cpu_percent < 70.0 {
            1.0
        } else if self.cpu_percent < 85.0 {
            0.7
        } else {
            0.3
        };

        let memory_factor = if self.memory_percent < 70.0 {
            1.0
        } else if self.memory_percent < 85.0 {
            0.7
        } else {
            0.3
        };

        let error_factor = if self.error_rate < 0.05 {
            1.0
        } else if self.error_rate < 0.1 {
            0.7
        } else {
            0.2
        };

        let quality_factor = if self.quality_score > 0.8 {
            1.0
        } else if self.quality_score > 0.6 {
            0.8
        } else if self.quality_score > 0.4 {
            0.5
        } else {
            0.4
        };

        (cpu_factor + memory_factor + error_factor + quality_factor) / 4.0
    }

    /// Re-evaluate bottleneck indicators against the default thresholds
    pub fn detect_bottlenecks(&mut self) -> &[String] {
        self.detect_bottlenecks_with(&BottleneckThresholds::default())
    }

    /// Clear and repopulate bottleneck indicators
    pub fn detect_bottlenecks_with(&mut self, thresholds: &BottleneckThresholds) -> &[String] {
        self.bottleneck_indicators.clear();

        if self.cpu_percent > thresholds.cpu_percent {
            self.bottleneck_indicators
                .push(format!("High CPU usage: {:.1}%", self.cpu_percent));
        }
        if self.memory_percent > thresholds.memory_percent {
            self.bottleneck_indicators
                .push(format!("High memory usage: {:.1}%", self.memory_percent));
        }
        if f64::from(self.queued_tasks) > thresholds.queue_ratio * f64::from(self.active_tasks) {
            self.bottleneck_indicators.push(format!(
                "Task queue backlog: {} queued vs {} active",
                self.queued_tasks, self.active_tasks
            ));
        }
        if self.error_rate > thresholds.error_rate {
            self.bottleneck_indicators
                .push(format!("High error rate: {:.1}%", self.error_rate * 100.0));
        }
        if self.average_task_duration > thresholds.task_duration_secs {
            self.bottleneck_indicators.push(format!(
                "Slow task completion: {:.1}s average",
                self.average_task_duration
            ));
        }

        &self.bottleneck_indicators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cpu: f64, mem: f64, active: u32, queued: u32) -> ResourceMetrics {
        let mut m = ResourceMetrics {
            cpu_percent: cpu,
            memory_percent: mem,
            active_tasks: active,
            queued_tasks: queued,
            quality_score: 0.9,
            ..Default::default()
        };
        m.recompute_derived();
        m
    }

    #[test]
    fn test_overall_utilization_formula() {
        let m = metrics(50.0, 40.0, 2, 1);
        // 0.4*50 + 0.3*40 + 0.3*30 = 20 + 12 + 9 = 41
        assert!((m.overall_utilization() - 0.41).abs() < 1e-9);
    }

    #[test]
    fn test_task_pressure_capped() {
        let m = metrics(100.0, 100.0, 50, 50);
        assert!((m.overall_utilization() - 1.0).abs() < 1e-9);

        let idle = metrics(0.0, 0.0, 0, 0);
        assert_eq!(idle.overall_utilization(), 0.0);
    }

    #[test]
    fn test_utilization_is_deterministic() {
        let a = metrics(33.0, 66.0, 3, 4);
        let b = metrics(33.0, 66.0, 3, 4);
        assert_eq!(a.calculate_overall_utilization(), b.calculate_overall_utilization());
    }

    #[test]
    fn test_health_score_buckets() {
        let healthy = metrics(10.0, 10.0, 1, 0);
        assert!((healthy.health_score() - 1.0).abs() < 1e-9);

        let mut stressed = ResourceMetrics {
            cpu_percent: 90.0,
            memory_percent: 75.0,
            error_rate: 0.2,
            quality_score: 0.5,
            ..Default::default()
        };
        stressed.recompute_derived();
        // (0.3 + 0.7 + 0.2 + 0.5) / 4
        assert!((stressed.health_score() - 0.425).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_averages_every_factor() {
        // CPU and memory in the middle bucket, error and quality healthy
        let m = metrics(80.0, 80.0, 0, 0);
        assert!((m.health_score() - (0.7 + 0.7 + 1.0 + 1.0) / 4.0).abs() < 1e-9);

        let mut worst = ResourceMetrics {
            cpu_percent: 99.0,
            memory_percent: 99.0,
            error_rate: 1.0,
            ..Default::default()
        };
        worst.recompute_derived();
        assert!((worst.health_score() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_host_keeps_task_counters() {
        let mut worker = metrics(95.0, 10.0, 2, 1);
        worker.completed_tasks = 8;
        assert!(worker.has_bottlenecks());

        let host = ResourceMetrics::from_host(&HostSample {
            timestamp: 99,
            cpu_percent: 15.0,
            memory_percent: 20.0,
            ..Default::default()
        });
        worker.refresh_host(&host, &BottleneckThresholds::default());

        assert_eq!(worker.timestamp, 99);
        assert_eq!(worker.cpu_percent, 15.0);
        assert_eq!(worker.active_tasks, 2);
        assert_eq!(worker.completed_tasks, 8);
        assert!(!worker.has_bottlenecks());
        // 0.4*15 + 0.3*20 + 0.3*30
        assert!((worker.overall_utilization() - 0.21).abs() < 1e-9);
    }

    #[test]
    fn test_detect_bottlenecks_all_thresholds() {
        let mut m = ResourceMetrics {
            cpu_percent: 90.0,
            memory_percent: 90.0,
            active_tasks: 1,
            queued_tasks: 5,
            error_rate: 0.5,
            average_task_duration: 400.0,
            ..Default::default()
        };
        assert_eq!(m.detect_bottlenecks().len(), 5);
    }

    #[test]
    fn test_detect_bottlenecks_recomputes_not_accumulates() {
        let mut m = metrics(95.0, 10.0, 1, 0);
        assert_eq!(m.bottleneck_indicators().len(), 1);
        assert!(m.bottleneck_indicators()[0].contains("CPU"));

        m.cpu_percent = 20.0;
        assert!(m.detect_bottlenecks().is_empty());
        assert!(!m.has_bottlenecks());
    }

    #[test]
    fn test_custom_thresholds() {
        let mut m = metrics(80.0, 10.0, 1, 0);
        assert!(!m.has_bottlenecks());

        let strict = BottleneckThresholds {
            cpu_percent: 75.0,
            ..Default::default()
        };
        m.recompute_derived_with(&strict);
        assert_eq!(m.bottleneck_indicators().len(), 1);
    }

    #[test]
    fn test_from_host_sample() {
        let sample = HostSample {
            timestamp: 42,
            cpu_percent: 25.0,
            memory_percent: 50.0,
            disk_percent: 10.0,
            network_bytes_sent: 7,
            network_bytes_recv: 9,
        };
        let m = ResourceMetrics::from_host(&sample);
        assert_eq!(m.timestamp, 42);
        assert_eq!(m.network_bytes_recv, 9);
        assert!((m.overall_utilization() - 0.25).abs() < 1e-9);
    }
}
