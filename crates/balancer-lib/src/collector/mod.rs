//! Host resource sampling
//!
//! The balancer reads CPU, memory, disk and network figures through the
//! [`MetricsSource`] trait. [`SystemMetricsSource`] samples the local host;
//! [`StaticMetricsSource`] serves a fixed, settable sample for simulations
//! and tests.

mod system;

pub use system::{SystemMetricsSource, CPU_SAMPLE_WINDOW};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

pub use async_trait::async_trait;

/// Raw host figures from one sampling pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostSample {
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_recv: u64,
}

impl Default for HostSample {
    fn default() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            network_bytes_sent: 0,
            network_bytes_recv: 0,
        }
    }
}

/// Trait for host metrics sampling implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Take one sample of host resource usage
    async fn sample(&self) -> Result<HostSample>;
}

/// Serves whatever sample was last set
#[derive(Debug, Default)]
pub struct StaticMetricsSource {
    sample: RwLock<HostSample>,
}

impl StaticMetricsSource {
    pub fn new(sample: HostSample) -> Self {
        Self {
            sample: RwLock::new(sample),
        }
    }

    /// Replace the served sample
    pub fn set(&self, sample: HostSample) {
        match self.sample.write() {
            Ok(mut guard) => *guard = sample,
            Err(poisoned) => *poisoned.into_inner() = sample,
        }
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn sample(&self) -> Result<HostSample> {
        let sample = match self.sample.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Ok(HostSample {
            timestamp: chrono::Utc::now().timestamp(),
            ..sample
        })
    }
}

/// Create the sampler for the local host
pub fn create_source() -> Arc<dyn MetricsSource> {
    tracing::info!("Sampling host resources via sysinfo");
    Arc::new(SystemMetricsSource::new())
}
