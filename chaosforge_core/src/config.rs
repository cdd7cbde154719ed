//! Engine configuration.
//!
//! Delays are stored in milliseconds so a JSON config stays readable.
//! Every section has defaults matching the documented behaviour, and a
//! partial config file only overrides the fields it names.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::chaos::ChaosTables;
use crate::error::ConfigError;

/// Order state machine timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTimings {
    /// pending -> processing
    pub processing_delay_ms: u64,
    /// processing -> completed | failed
    pub completion_delay_ms: u64,
}

impl Default for OrderTimings {
    fn default() -> Self {
        Self {
            processing_delay_ms: 2_000,
            completion_delay_ms: 3_000,
        }
    }
}

/// Job state machine timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTimings {
    /// queued -> running (0 = next scheduler turn)
    pub start_delay_ms: u64,
    /// running -> completed | failed, unless the job requests its own
    pub default_run_time_ms: u64,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            start_delay_ms: 0,
            default_run_time_ms: 5_000,
        }
    }
}

/// Resource state machine timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTimings {
    /// provisioning -> initializing
    pub initializing_delay_ms: u64,
    /// initializing -> ready | error
    pub ready_delay_ms: u64,
}

impl Default for ResourceTimings {
    fn default() -> Self {
        Self {
            initializing_delay_ms: 2_000,
            ready_delay_ms: 4_000,
        }
    }
}

/// Lag between a write and its visibility in each derived view.
/// The immediate view has no lag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationLags {
    pub cached_ms: u64,
    pub search_ms: u64,
    pub analytics_ms: u64,
}

impl Default for PropagationLags {
    fn default() -> Self {
        Self {
            cached_ms: 2_000,
            search_ms: 5_000,
            analytics_ms: 10_000,
        }
    }
}

impl PropagationLags {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cached_ms <= self.search_ms && self.search_ms <= self.analytics_ms {
            Ok(())
        } else {
            Err(ConfigError::LagOrder)
        }
    }
}

/// Sizes of the aggregate listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedLimits {
    /// Most recent activity events merged into the feed
    pub activity_window: usize,
    /// Maximum feed length
    pub feed_size: usize,
    /// Length of the recent-comments listing
    pub recent_comments: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            activity_window: 10,
            feed_size: 20,
            recent_comments: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub order: OrderTimings,
    pub job: JobTimings,
    pub resource: ResourceTimings,
    pub propagation: PropagationLags,
    pub chaos: ChaosTables,
    pub feed: FeedLimits,
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chaos.validate()?;
        self.propagation.validate()
    }

    pub fn default_job_run_time(&self) -> Duration {
        Duration::from_millis(self.job.default_run_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.order.processing_delay_ms, 2_000);
        assert_eq!(config.order.completion_delay_ms, 3_000);
        assert_eq!(config.resource.ready_delay_ms, 4_000);
        assert_eq!(config.default_job_run_time(), Duration::from_secs(5));
        assert_eq!(config.propagation.analytics_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "order": { "processing_delay_ms": 100 }, "chaos": { "order_outcome": { "success": 1.0, "failure_status": 402 } } }"#,
        )
        .unwrap();

        assert_eq!(config.order.processing_delay_ms, 100);
        assert_eq!(config.order.completion_delay_ms, 3_000);
        assert_eq!(config.chaos.order_outcome.success, 1.0);
        assert_eq!(config.chaos.job_outcome.success, 0.85);
    }

    #[test]
    fn test_rejects_unordered_lags() {
        let result = EngineConfig::from_json_str(
            r#"{ "propagation": { "cached_ms": 6000, "search_ms": 5000, "analytics_ms": 10000 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::LagOrder)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{ order: "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::from_json_file("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
