//! Build gate and no-op facade
//!
//! Callers always get a [`PerfMonitor`]. Whether it is live is decided once,
//! when the [`PerfContext`] is built, so instrumented code never checks for
//! the monitor's existence and release builds never pay for sampling.

use crate::buffer::MetricKey;
use crate::config::MonitorConfig;
use crate::error::PerfResult;
use crate::monitor::{LiveMonitor, Subscription};
use crate::platform::Platform;
use crate::snapshot::PerfSnapshot;
use crate::stats::MetricStats;
use crate::timing::OperationTimer;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Subscriber callback as accepted through the trait object.
pub type SubscriberFn = Box<dyn Fn(&PerfSnapshot)>;

/// Contract shared by the live monitor and its no-op stand-in.
pub trait PerfMonitor {
    /// Begin platform sampling; idempotent.
    fn start(&self);

    /// Stop platform sampling, keeping data; idempotent.
    fn stop(&self);

    fn is_active(&self) -> bool;

    /// Drop all recorded samples and operations.
    fn clear(&self);

    /// Record a sample and notify subscribers.
    fn record(&self, key: MetricKey, value: f64);

    /// Log a labeled operation and notify subscribers.
    fn record_operation(&self, label: &str, duration_ms: f64);

    /// Statistics for `key`, `None` when it has no samples.
    fn get_stats(&self, key: MetricKey) -> Option<MetricStats>;

    fn get_snapshot(&self) -> PerfSnapshot;

    /// Register a callback that receives a snapshot after every recording.
    fn subscribe(&self, callback: SubscriberFn) -> Subscription;
}

/// Monitor that ignores everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopMonitor;

impl PerfMonitor for NoopMonitor {
    fn start(&self) {}

    fn stop(&self) {}

    fn is_active(&self) -> bool {
        false
    }

    fn clear(&self) {}

    #[inline]
    fn record(&self, _key: MetricKey, _value: f64) {}

    #[inline]
    fn record_operation(&self, _label: &str, _duration_ms: f64) {}

    fn get_stats(&self, _key: MetricKey) -> Option<MetricStats> {
        None
    }

    fn get_snapshot(&self) -> PerfSnapshot {
        PerfSnapshot::empty()
    }

    fn subscribe(&self, _callback: SubscriberFn) -> Subscription {
        Subscription::inert()
    }
}

/// Flags that decide whether the live monitor is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFlags {
    /// Profiling was requested at build time
    pub profiling_enabled: bool,
    /// This is a development build
    pub dev_build: bool,
}

impl BuildFlags {
    pub fn new(profiling_enabled: bool, dev_build: bool) -> Self {
        Self {
            profiling_enabled,
            dev_build,
        }
    }

    /// Flags of the current build: the `profiling` feature and debug assertions.
    pub fn from_build() -> Self {
        Self {
            profiling_enabled: cfg!(feature = "profiling"),
            dev_build: cfg!(debug_assertions),
        }
    }

    /// Both flags must be set for live monitoring.
    pub fn is_live(&self) -> bool {
        self.profiling_enabled && self.dev_build
    }
}

/// Application-wide handle to the one monitor of this process.
///
/// Build it once at startup and pass it, or clones of
/// [`shared`](Self::shared), to whatever needs instrumentation.
pub struct PerfContext {
    monitor: Rc<dyn PerfMonitor>,
    live: Option<LiveMonitor>,
    flags: BuildFlags,
}

impl PerfContext {
    /// Choose between a live and a no-op monitor.
    ///
    /// The configuration is validated even when the no-op monitor is chosen.
    pub fn new(flags: BuildFlags, config: MonitorConfig, platform: Platform) -> PerfResult<Self> {
        config.validate()?;

        let context = if flags.is_live() {
            let live = LiveMonitor::new(config, platform)?;
            Self {
                monitor: Rc::new(live.clone()),
                live: Some(live),
                flags,
            }
        } else {
            Self {
                monitor: Rc::new(NoopMonitor),
                live: None,
                flags,
            }
        };

        tracing::info!(
            target: "perf::gate",
            live = flags.is_live(),
            profiling = flags.profiling_enabled,
            dev_build = flags.dev_build,
            "performance monitor selected"
        );
        Ok(context)
    }

    /// Gate on the flags this crate was compiled with.
    pub fn from_build(config: MonitorConfig, platform: Platform) -> PerfResult<Self> {
        Self::new(BuildFlags::from_build(), config, platform)
    }

    /// The selected monitor.
    pub fn monitor(&self) -> &dyn PerfMonitor {
        self.monitor.as_ref()
    }

    /// Shared handle for consumers that keep the monitor around.
    pub fn shared(&self) -> Rc<dyn PerfMonitor> {
        Rc::clone(&self.monitor)
    }

    /// The live monitor, for diagnostics that only it offers.
    pub fn live(&self) -> Option<&LiveMonitor> {
        self.live.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn flags(&self) -> BuildFlags {
        self.flags
    }

    /// Start timing an operation on the selected monitor.
    pub fn time(&self, label: impl Into<String>) -> OperationTimer<'_> {
        OperationTimer::start(self.monitor(), label)
    }
}
