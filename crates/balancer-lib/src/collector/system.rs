//! Local host sampling via sysinfo

use super::{async_trait, HostSample, MetricsSource};
use anyhow::Result;
use std::time::Duration;
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;
use tracing::debug;

/// Window between the two CPU refreshes needed for a usage reading
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Samples CPU, memory, disk and network usage of the local host
pub struct SystemMetricsSource {
    system: Mutex<System>,
    window: Duration,
}

impl SystemMetricsSource {
    pub fn new() -> Self {
        Self::with_window(CPU_SAMPLE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            window,
        }
    }
}

impl Default for SystemMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SystemMetricsSource {
    async fn sample(&self) -> Result<HostSample> {
        let mut system = self.system.lock().await;

        // CPU usage is the delta between two refreshes
        system.refresh_cpu();
        tokio::time::sleep(self.window).await;
        system.refresh_cpu();
        system.refresh_memory();

        let cpus = system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("no CPUs reported by the host");
        }
        let cpu_percent =
            cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).sum::<f64>() / cpus.len() as f64;

        let total_memory = system.total_memory();
        if total_memory == 0 {
            anyhow::bail!("total memory reported as zero");
        }
        let memory_percent = system.used_memory() as f64 / total_memory as f64 * 100.0;
        drop(system);

        let disks = Disks::new_with_refreshed_list();
        let (total_space, available_space) = disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });
        let disk_percent = if total_space == 0 {
            0.0
        } else {
            total_space.saturating_sub(available_space) as f64 / total_space as f64 * 100.0
        };

        let networks = Networks::new_with_refreshed_list();
        let (network_bytes_sent, network_bytes_recv) =
            networks
                .iter()
                .fold((0u64, 0u64), |(sent, recv), (_name, data)| {
                    (
                        sent + data.total_transmitted(),
                        recv + data.total_received(),
                    )
                });

        debug!(
            cpu_percent,
            memory_percent, disk_percent, "Sampled host resources"
        );

        Ok(HostSample {
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent: cpu_percent.clamp(0.0, 100.0),
            memory_percent: memory_percent.clamp(0.0, 100.0),
            disk_percent: disk_percent.clamp(0.0, 100.0),
            network_bytes_sent,
            network_bytes_recv,
        })
    }
}
