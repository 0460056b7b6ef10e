//! Error types for the performance monitor.

use thiserror::Error;

/// Errors that can occur while configuring or wiring the monitor.
///
/// None of these ever escape a recording or query call on a running
/// monitor; platform failures are absorbed into [`crate::Capability`].
#[derive(Debug, Error)]
pub enum PerfError {
    /// A platform facility is missing or failed during setup
    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(String),

    /// A metric name that is not tracked by the monitor
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse a JSON configuration
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for monitor operations.
pub type PerfResult<T> = Result<T, PerfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PerfError::FeatureUnavailable("no observer".to_string());
        assert_eq!(err.to_string(), "Feature unavailable: no observer");

        let err = PerfError::UnknownMetric("cls".to_string());
        assert_eq!(err.to_string(), "Unknown metric: cls");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PerfError = json_err.into();
        assert!(matches!(err, PerfError::Config(_)));
    }
}
