//! Real-time Performance Monitor
//!
//! This crate collects runtime performance signals for the editor UI:
//! - Frame rate and frame time from the platform's repaint loop
//! - Slow interactions and long main-thread tasks from the platform's entry observer
//! - Ad-hoc timed operations recorded by instrumented code
//!
//! Each signal keeps a bounded history; statistics (min/max/avg and
//! nearest-rank p50/p95/p99) are computed on demand, and subscribers receive
//! an immutable [`PerfSnapshot`] after every recording.
//!
//! # Feature Flags
//!
//! - `profiling` (default): Allows the live monitor. It is only selected in
//!   builds with debug assertions; otherwise [`PerfContext`] hands out a
//!   [`NoopMonitor`] with the same interface.
//!
//! # Example
//!
//! ```rust
//! use perf_monitor::{BuildFlags, MetricKey, MonitorConfig, PerfContext, PerfMonitor, Platform};
//!
//! let context = PerfContext::new(
//!     BuildFlags::new(true, true),
//!     MonitorConfig::default(),
//!     Platform::headless(),
//! )
//! .unwrap();
//!
//! let monitor = context.monitor();
//! monitor.start();
//! monitor.record(MetricKey::Inp, 96.0);
//! monitor.record_operation("layout", 4.2);
//!
//! let stats = monitor.get_stats(MetricKey::Inp).unwrap();
//! assert_eq!(stats.p95, 96.0);
//! ```

mod buffer;
mod config;
mod error;
mod gate;
mod monitor;
mod operations;
pub mod platform;
mod snapshot;
mod source;
mod stats;
mod timing;

pub use buffer::{MetricBuffer, MetricKey, MetricStore};
pub use config::MonitorConfig;
pub use error::{PerfError, PerfResult};
pub use gate::{BuildFlags, NoopMonitor, PerfContext, PerfMonitor, SubscriberFn};
pub use monitor::{LiveMonitor, Subscription};
pub use operations::{Operation, OperationLog};
pub use platform::{Capability, Platform};
pub use snapshot::PerfSnapshot;
pub use source::{ObserverBinding, SampleSource, SamplingStatus};
pub use stats::{nearest_rank, MetricStats};
pub use timing::OperationTimer;
