//! Engine configuration.

use crate::errors::EngineError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shaping engine behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of pipeline runs executing concurrently.
    pub max_concurrent_pipelines: usize,
    /// Timeout applied to runs whose definition sets none.
    pub default_timeout: Duration,
    /// Retry policy applied to steps with no pipeline or step override.
    pub default_retry_policy: RetryPolicy,
    /// Event queue capacity used by `Engine::with_buffered_sink` when it
    /// wraps a downstream sink.
    pub buffer_size: usize,
    /// Whether metrics-oriented events are emitted through the sink.
    pub enable_metrics: bool,
    /// Whether tracing-oriented events are emitted through the sink.
    pub enable_tracing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 8,
            default_timeout: Duration::from_secs(30),
            default_retry_policy: RetryPolicy::default(),
            buffer_size: 64,
            enable_metrics: false,
            enable_tracing: true,
        }
    }
}

impl EngineConfig {
    /// Creates a config with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrent run limit.
    #[must_use]
    pub fn with_max_concurrent_pipelines(mut self, max: usize) -> Self {
        self.max_concurrent_pipelines = max;
        self
    }

    /// Sets the default pipeline timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the default retry policy.
    #[must_use]
    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    /// Sets the event queue capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enables or disables metrics events.
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Enables or disables tracing events.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Returns true when any observability events should flow to the sink.
    #[must_use]
    pub fn observability_enabled(&self) -> bool {
        self.enable_metrics || self.enable_tracing
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] naming the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrent_pipelines < 1 {
            return Err(EngineError::configuration(
                "max_concurrent_pipelines must be at least 1",
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(EngineError::configuration(
                "default_timeout must be greater than zero",
            ));
        }
        if self.buffer_size < 1 {
            return Err(EngineError::configuration("buffer_size must be at least 1"));
        }
        self.default_retry_policy
            .validate()
            .map_err(EngineError::configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_pipelines, 8);
        assert!(config.observability_enabled());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::new()
            .with_max_concurrent_pipelines(2)
            .with_default_timeout(Duration::from_secs(5))
            .with_buffer_size(16)
            .with_metrics(true)
            .with_tracing(false);

        assert_eq!(config.max_concurrent_pipelines, 2);
        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.buffer_size, 16);
        assert!(config.observability_enabled());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(EngineConfig::new()
            .with_max_concurrent_pipelines(0)
            .validate()
            .is_err());
        assert!(EngineConfig::new()
            .with_default_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(EngineConfig::new().with_buffer_size(0).validate().is_err());

        let bad_retry = EngineConfig::new()
            .with_default_retry_policy(RetryPolicy::new().with_max_attempts(0));
        assert!(bad_retry.validate().is_err());
    }
}
