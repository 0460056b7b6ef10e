//! Monitor configuration

use crate::error::{PerfError, PerfResult};
use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::LiveMonitor`].
///
/// Capacities bound the memory the monitor may hold; thresholds decide
/// which platform entries count as slow interactions or long tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Maximum samples kept per metric key.
    pub max_samples: usize,

    /// Maximum operations kept in the operation log.
    pub max_operations: usize,

    /// Number of most recent operations carried in each snapshot.
    pub snapshot_operations: usize,

    /// Length of one frame-rate sampling window in milliseconds.
    ///
    /// One `fps` and one `tick` sample are recorded per completed window.
    pub sample_window_ms: f64,

    /// Interaction entries longer than this are recorded as `inp`.
    pub inp_threshold_ms: f64,

    /// Long-task entries longer than this are recorded as `longtask`.
    ///
    /// Platforms usually report only tasks above 50ms already.
    pub long_task_threshold_ms: f64,
}

impl MonitorConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            max_samples: 256,
            max_operations: 100,
            snapshot_operations: 10,
            sample_window_ms: 1000.0,
            inp_threshold_ms: 40.0,
            long_task_threshold_ms: 50.0,
        }
    }

    /// Small buffers for constrained environments.
    pub fn lightweight() -> Self {
        Self {
            max_samples: 64,
            max_operations: 20,
            snapshot_operations: 5,
            ..Self::new()
        }
    }

    /// Deep history and finer sampling for profiling sessions.
    pub fn detailed() -> Self {
        Self {
            max_samples: 1024,
            max_operations: 500,
            snapshot_operations: 25,
            sample_window_ms: 500.0,
            inp_threshold_ms: 16.0,
            long_task_threshold_ms: 50.0,
        }
    }

    /// Builder method to set the per-metric sample capacity.
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples = max;
        self
    }

    /// Builder method to set the operation log capacity.
    pub fn with_max_operations(mut self, max: usize) -> Self {
        self.max_operations = max;
        self
    }

    /// Builder method to set how many operations a snapshot carries.
    pub fn with_snapshot_operations(mut self, count: usize) -> Self {
        self.snapshot_operations = count;
        self
    }

    /// Builder method to set the frame sampling window.
    pub fn with_sample_window(mut self, ms: f64) -> Self {
        self.sample_window_ms = ms;
        self
    }

    /// Builder method to set the interaction delay threshold.
    pub fn with_inp_threshold(mut self, ms: f64) -> Self {
        self.inp_threshold_ms = ms;
        self
    }

    /// Builder method to set the long task threshold.
    pub fn with_long_task_threshold(mut self, ms: f64) -> Self {
        self.long_task_threshold_ms = ms;
        self
    }

    /// Parse and validate a JSON configuration.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> PerfResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> PerfResult<()> {
        if self.max_samples == 0 {
            return Err(PerfError::InvalidConfig(
                "maxSamples must be at least 1".to_string(),
            ));
        }
        if self.max_operations == 0 {
            return Err(PerfError::InvalidConfig(
                "maxOperations must be at least 1".to_string(),
            ));
        }
        if self.sample_window_ms.is_nan() || self.sample_window_ms <= 0.0 {
            return Err(PerfError::InvalidConfig(format!(
                "sampleWindowMs must be positive, got {}",
                self.sample_window_ms
            )));
        }
        let thresholds = [self.inp_threshold_ms, self.long_task_threshold_ms];
        if thresholds.iter().any(|t| t.is_nan() || *t < 0.0) {
            return Err(PerfError::InvalidConfig(
                "thresholds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.max_samples, 256);
        assert_eq!(config.snapshot_operations, 10);
        assert_eq!(config.sample_window_ms, 1000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_presets_are_valid() {
        assert!(MonitorConfig::lightweight().validate().is_ok());
        assert!(MonitorConfig::detailed().validate().is_ok());
        assert!(MonitorConfig::detailed().max_samples > MonitorConfig::lightweight().max_samples);
    }

    #[test]
    fn test_config_builder() {
        let config = MonitorConfig::default()
            .with_max_samples(32)
            .with_max_operations(5)
            .with_inp_threshold(16.0);

        assert_eq!(config.max_samples, 32);
        assert_eq!(config.max_operations, 5);
        assert_eq!(config.inp_threshold_ms, 16.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            MonitorConfig::default().with_max_samples(0).validate(),
            Err(PerfError::InvalidConfig(_))
        ));
        assert!(matches!(
            MonitorConfig::default().with_max_operations(0).validate(),
            Err(PerfError::InvalidConfig(_))
        ));
        assert!(MonitorConfig::default().with_sample_window(0.0).validate().is_err());
        assert!(MonitorConfig::default().with_sample_window(f64::NAN).validate().is_err());
        assert!(MonitorConfig::default().with_long_task_threshold(-1.0).validate().is_err());
    }

    #[test]
    fn test_config_from_json_partial() {
        let config = MonitorConfig::from_json(r#"{"maxSamples": 128, "inpThresholdMs": 24}"#).unwrap();
        assert_eq!(config.max_samples, 128);
        assert_eq!(config.inp_threshold_ms, 24.0);
        assert_eq!(config.max_operations, 100);
    }

    #[test]
    fn test_config_from_json_rejects_invalid() {
        assert!(matches!(
            MonitorConfig::from_json(r#"{"maxOperations": 0}"#),
            Err(PerfError::InvalidConfig(_))
        ));
        assert!(matches!(
            MonitorConfig::from_json("{"),
            Err(PerfError::Config(_))
        ));
    }
}
