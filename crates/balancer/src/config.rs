//! Service configuration

use anyhow::{bail, Context, Result};
use balancer_lib::LoadBalancingConfig;
use serde::Deserialize;
use tracing::warn;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "SWARM_LB_CONFIG";

const ENV_PREFIX: &str = "SWARM_LB";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to structured log records
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for health, metrics and status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub balancer: LoadBalancingConfig,

    #[serde(default)]
    pub pool: PoolConfig,
}

/// Simulated agent pool and synthetic task feed
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: Vec<WorkerSpec>,

    /// Delay between synthetic task submissions
    #[serde(default = "default_task_interval")]
    pub task_interval_ms: u64,

    /// Route synthetic tasks through the batch queue
    #[serde(default)]
    pub batch_mode: bool,

    /// Sample the local host; otherwise serve a fixed idle sample
    #[serde(default = "default_sample_host")]
    pub sample_host: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerSpec {
    pub id: String,

    #[serde(default)]
    pub specializations: Vec<String>,

    /// Concurrent tasks at which the worker reports full load
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    #[serde(default = "default_base_latency")]
    pub base_latency_ms: u64,

    #[serde(default = "default_base_quality")]
    pub base_quality: f64,
}

fn default_service_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "swarm-balancer".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_task_interval() -> u64 {
    500
}

fn default_sample_host() -> bool {
    true
}

fn default_capacity() -> u32 {
    4
}

fn default_base_latency() -> u64 {
    1500
}

fn default_base_quality() -> f64 {
    0.85
}

fn worker(id: &str, specializations: &[&str], capacity: u32, latency: u64, quality: f64) -> WorkerSpec {
    WorkerSpec {
        id: id.to_string(),
        specializations: specializations.iter().map(|s| s.to_string()).collect(),
        capacity,
        base_latency_ms: latency,
        base_quality: quality,
    }
}

fn default_workers() -> Vec<WorkerSpec> {
    vec![
        worker("content-agent-math", &["math", "science"], 4, 1200, 0.88),
        worker("content-agent-humanities", &["history", "literature"], 4, 1500, 0.85),
        worker("content-agent-general", &[], 6, 1800, 0.78),
    ]
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_interval_ms: default_task_interval(),
            batch_mode: false,
            sample_host: default_sample_host(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            balancer: LoadBalancingConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            bail!("pool.workers must not be empty");
        }
        if self.task_interval_ms == 0 {
            bail!("pool.task_interval_ms must be greater than zero");
        }
        for spec in &self.workers {
            if spec.id.is_empty() {
                bail!("pool.workers entries need a non-empty id");
            }
            if spec.capacity == 0 {
                bail!("worker {} has zero capacity", spec.id);
            }
            if !(0.0..=1.0).contains(&spec.base_quality) {
                bail!("worker {} base_quality must be within [0, 1]", spec.id);
            }
        }
        let mut ids: Vec<&str> = self.workers.iter().map(|w| w.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("duplicate worker id {}", pair[0]);
        }
        Ok(())
    }
}

impl ServiceConfig {
    /// Load configuration from the environment and an optional file
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config = Self::from_settings(settings);
        config.validate()?;
        Ok(config)
    }

    fn from_settings(settings: config::Config) -> Self {
        settings.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid configuration, using defaults");
            ServiceConfig::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.balancer
            .validate()
            .context("Invalid balancer configuration")?;
        self.pool.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancer_lib::Strategy;

    fn parse(toml: &str) -> ServiceConfig {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        ServiceConfig::from_settings(settings)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.pool.workers.len(), 3);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_file_overrides() {
        let config = parse(
            r#"
            api_port = 9100

            [balancer]
            strategy = "educational_optimized"
            batch_size = 4

            [pool]
            task_interval_ms = 100

            [[pool.workers]]
            id = "agent-a"
            specializations = ["math"]
            capacity = 2
            "#,
        );

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.balancer.strategy, Strategy::EducationalOptimized);
        assert_eq!(config.balancer.batch_size, 4);
        assert!(config.balancer.enable_adaptive_strategy);
        assert_eq!(config.pool.task_interval_ms, 100);
        assert_eq!(config.pool.workers.len(), 1);
        assert_eq!(config.pool.workers[0].base_latency_ms, 1500);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_malformed_falls_back_to_defaults() {
        let config = parse("api_port = \"not a port\"");
        assert_eq!(config.api_port, 8080);
    }

    #[test]
    fn test_rejects_duplicate_worker_ids() {
        let mut config = ServiceConfig::default();
        config.pool.workers.push(config.pool.workers[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate worker id"));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = ServiceConfig::default();
        config.pool.workers[1].capacity = 0;
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_rejects_invalid_balancer_settings() {
        let mut config = ServiceConfig::default();
        config.balancer.rebalancing_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
