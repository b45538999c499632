//! Error types for the load balancer

use thiserror::Error;

/// Errors surfaced by the public load balancer API
///
/// Background loops never return these to callers; they log and carry on.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("load balancer is already initialized (state: {0})")]
    AlreadyInitialized(String),

    #[error("load balancer is not running (state: {0})")]
    NotRunning(String),

    #[error("failed to collect resource metrics")]
    MetricsCollection(#[source] anyhow::Error),

    #[error("insufficient metrics history: {available} samples, need {required}")]
    InsufficientHistory { available: usize, required: usize },

    #[error("batch mode is disabled")]
    BatchModeDisabled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_message() {
        let err = BalancerError::InsufficientHistory {
            available: 3,
            required: 5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient metrics history: 3 samples, need 5"
        );
    }

    #[test]
    fn test_metrics_collection_keeps_source() {
        let err = BalancerError::MetricsCollection(anyhow::anyhow!("permission denied"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("permission denied"));
    }
}
