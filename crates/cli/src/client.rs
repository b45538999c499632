//! API client for the balancer service

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the balancer service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.client
            .get(url)
            .send()
            .await
            .context("Failed to send request")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET a probe endpoint whose body is meaningful on 503 too
    ///
    /// Returns whether the status was a success alongside the parsed body.
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(bool, T)> {
        let response = self.send(path).await?;
        let ok = response.status().is_success();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((ok, body))
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub lifecycle: String,
    pub strategy: String,
    pub worker_count: usize,
    pub workers: BTreeMap<String, WorkerSummary>,
    #[serde(default)]
    pub recent_allocations: BTreeMap<String, u64>,
    pub average_quality: f64,
    #[serde(default)]
    pub recent_alerts: Vec<Alert>,
    #[serde(default)]
    pub subject_distribution: BTreeMap<String, u64>,
    #[serde(default)]
    pub grade_level_distribution: BTreeMap<String, u64>,
    pub batch: BatchInfo,
    #[serde(default)]
    pub load_predictions: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_forecast: Option<CapacityForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSummary>,
    pub generated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub load_factor: f64,
    pub weight: u32,
    pub utilization: f64,
    pub health_score: f64,
    pub predicted_completion_time: f64,
    pub predicted_quality_score: f64,
    pub workload_trend: String,
    #[serde(default)]
    pub specializations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: i64,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub severity: String,
    pub indicators: Vec<String>,
    pub overall_utilization: f64,
    pub health_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub enabled: bool,
    pub pending: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSummary {
    pub utilization: f64,
    pub health_score: f64,
    pub error_rate: f64,
    #[serde(default)]
    pub bottlenecks: Vec<String>,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceFigures {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub tasks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityForecast {
    pub periods_ahead: f64,
    pub forecast: ResourceFigures,
    pub samples_used: usize,
    pub generated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub time_horizon_minutes: u32,
    pub current: ResourceFigures,
    pub predicted: ResourceFigures,
    pub trends: ResourceFigures,
    pub recommendation: String,
    pub confidence: f64,
    pub samples_used: usize,
    pub generated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub error_rate: f64,
    pub overall_utilization: f64,
    pub health_score: f64,
    #[serde(default)]
    pub bottleneck_indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: i64,
    pub duration_secs: f64,
    pub quality: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDetail {
    pub worker_id: String,
    pub current_metrics: WorkerMetrics,
    pub load_factor: f64,
    #[serde(default)]
    pub capabilities: BTreeMap<String, f64>,
    pub capability_score: f64,
    #[serde(default)]
    pub educational_specializations: Vec<String>,
    pub educational_specialization_score: f64,
    #[serde(default)]
    pub performance_history: Vec<PerformanceSample>,
    pub predicted_completion_time: f64,
    pub predicted_quality_score: f64,
    pub workload_trend: String,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/predictions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"time_horizon_minutes":30,
                    "current":{"cpu_percent":50.0,"memory_percent":40.0,"tasks":3.0},
                    "predicted":{"cpu_percent":85.0,"memory_percent":45.0,"tasks":4.0},
                    "trends":{"cpu_percent":10.0,"memory_percent":1.0,"tasks":0.5},
                    "recommendation":"scale_up","confidence":0.7,"samples_used":6,
                    "generated_at":1700000000}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let prediction: Prediction = client
            .get("api/v1/predictions")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(prediction.recommendation, "scale_up");
        assert_eq!(prediction.predicted.cpu_percent, 85.0);
    }

    #[tokio::test]
    async fn test_get_surfaces_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/workers/ghost")
            .with_status(404)
            .with_body(r#"{"error":"worker not found: ghost"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<WorkerDetail>("api/v1/workers/ghost")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("worker not found: ghost"));
    }

    #[tokio::test]
    async fn test_probe_keeps_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(r#"{"ready":false,"reason":"Load balancer not running"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (ok, readiness): (bool, Readiness) = client.probe("readyz").await.unwrap();

        assert!(!ok);
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Load balancer not running"));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
