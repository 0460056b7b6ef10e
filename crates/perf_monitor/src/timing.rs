//! Scope timing for ad-hoc operations

use crate::gate::PerfMonitor;
use std::time::{Duration, Instant};

/// A timer that logs an operation on its monitor when dropped.
///
/// # Example
///
/// ```rust
/// use perf_monitor::{LiveMonitor, OperationTimer};
///
/// let monitor = LiveMonitor::headless();
/// {
///     let _timer = OperationTimer::start(&monitor, "parse_document");
///     // ... parsing ...
/// }
/// assert_eq!(monitor.get_snapshot().operations[0].label, "parse_document");
/// ```
pub struct OperationTimer<'a> {
    monitor: &'a dyn PerfMonitor,
    label: String,
    start: Instant,
    armed: bool,
}

impl<'a> OperationTimer<'a> {
    /// Start timing `label` now.
    #[inline]
    pub fn start(monitor: &'a dyn PerfMonitor, label: impl Into<String>) -> Self {
        Self {
            monitor,
            label: label.into(),
            start: Instant::now(),
            armed: true,
        }
    }

    /// Get the elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Restart the measurement from now.
    #[inline]
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Record the operation now and return its duration in milliseconds.
    pub fn finish(mut self) -> f64 {
        self.record()
    }

    /// Discard the measurement without recording it.
    pub fn cancel(mut self) -> f64 {
        self.armed = false;
        self.elapsed_ms()
    }

    fn record(&mut self) -> f64 {
        let elapsed_ms = self.elapsed_ms();
        if self.armed {
            self.armed = false;
            tracing::trace!(
                target: "perf::timing",
                label = %self.label,
                elapsed_ms,
                "timer completed"
            );
            self.monitor.record_operation(&self.label, elapsed_ms);
        }
        elapsed_ms
    }
}

impl Drop for OperationTimer<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

/// Time the rest of the enclosing scope as an operation.
///
/// # Example
///
/// ```rust
/// use perf_monitor::{time_operation, LiveMonitor};
///
/// fn layout(monitor: &LiveMonitor) {
///     time_operation!(monitor, "layout");
///     // ... layout ...
/// }
/// ```
#[macro_export]
macro_rules! time_operation {
    ($monitor:expr, $label:expr) => {
        let _timer = $crate::OperationTimer::start($monitor, $label);
    };
}
