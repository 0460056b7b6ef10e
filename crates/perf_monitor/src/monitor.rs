//! Live performance monitor
//!
//! [`LiveMonitor`] owns the metric buffers, the operation log, the sample
//! source and the subscriber list. Everything runs on one thread: handles
//! are cheap `Rc` clones and interior state sits behind `RefCell`s that are
//! never borrowed across a callback.

use crate::buffer::{MetricKey, MetricStore};
use crate::config::MonitorConfig;
use crate::error::PerfResult;
use crate::gate::{PerfMonitor, SubscriberFn};
use crate::operations::{Operation, OperationLog};
use crate::platform::{Clock, DocumentInspector, Platform};
use crate::snapshot::{frame_time_for, PerfSnapshot};
use crate::source::{SampleSink, SampleSource, SamplingStatus};
use crate::stats::MetricStats;
use crate::timing::OperationTimer;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Handle returned by `subscribe`; call [`unsubscribe`](Self::unsubscribe)
/// to stop receiving snapshots.
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription that was never registered anywhere.
    pub fn inert() -> Self {
        Self {
            cancel: RefCell::new(None),
        }
    }

    /// Stop notifications. Further calls do nothing.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether `unsubscribe` can still have an effect.
    pub fn is_active(&self) -> bool {
        self.cancel.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

struct SubscriberSlot {
    id: u64,
    callback: Rc<dyn Fn(&PerfSnapshot)>,
    live: Cell<bool>,
}

struct MonitorCore {
    config: MonitorConfig,
    clock: Rc<dyn Clock>,
    document: Option<Rc<dyn DocumentInspector>>,
    store: RefCell<MetricStore>,
    operations: RefCell<OperationLog>,
    subscribers: RefCell<Vec<Rc<SubscriberSlot>>>,
    next_subscriber: Cell<u64>,
    subscriber_failures: Cell<u64>,
    active: Cell<bool>,
    source: SampleSource,
}

impl MonitorCore {
    fn snapshot(&self) -> PerfSnapshot {
        let (dom_nodes, memory_mb) = match &self.document {
            Some(document) => (
                document.element_count(),
                document
                    .memory_used_bytes()
                    .map(|bytes| bytes as f64 / BYTES_PER_MB),
            ),
            None => (0, None),
        };

        let store = self.store.borrow();
        let fps = store.latest(MetricKey::Fps).unwrap_or(0.0);

        PerfSnapshot {
            fps,
            frame_time: frame_time_for(fps),
            dom_nodes,
            memory_mb,
            inp: store.latest(MetricKey::Inp),
            long_task_count: store.len(MetricKey::LongTask),
            stats: MetricKey::ALL
                .into_iter()
                .map(|key| (key, store.stats(key)))
                .collect(),
            operations: self
                .operations
                .borrow()
                .recent(self.config.snapshot_operations),
        }
    }

    /// Deliver one fresh snapshot to every live subscriber, in registration order.
    fn notify(&self) {
        let slots: Vec<Rc<SubscriberSlot>> = self.subscribers.borrow().clone();
        if slots.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for slot in slots {
            // Removed earlier in this round
            if !slot.live.get() {
                continue;
            }
            let callback = Rc::clone(&slot.callback);
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&snapshot)));
            if result.is_err() {
                self.subscriber_failures
                    .set(self.subscriber_failures.get() + 1);
                tracing::warn!(
                    target: "perf::monitor",
                    subscriber = slot.id,
                    "subscriber panicked during notification"
                );
            }
        }
    }

    fn remove_subscriber(&self, id: u64) {
        let mut subscribers = self.subscribers.borrow_mut();
        if let Some(slot) = subscribers.iter().find(|slot| slot.id == id) {
            slot.live.set(false);
        }
        subscribers.retain(|slot| slot.id != id);
    }
}

impl SampleSink for MonitorCore {
    fn ingest(&self, samples: &[(MetricKey, f64)]) {
        {
            let mut store = self.store.borrow_mut();
            for &(key, value) in samples {
                store.record(key, value);
            }
        }
        self.notify();
    }
}

/// Fully functional monitor.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct LiveMonitor {
    core: Rc<MonitorCore>,
}

impl LiveMonitor {
    /// Create an inactive monitor on `platform`.
    ///
    /// Platform facilities are probed here, once. Only an invalid
    /// configuration is an error.
    pub fn new(config: MonitorConfig, platform: Platform) -> PerfResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, platform))
    }

    /// Default configuration, no platform sampling.
    pub fn headless() -> Self {
        Self::from_parts(MonitorConfig::default(), Platform::headless())
    }

    fn from_parts(config: MonitorConfig, platform: Platform) -> Self {
        let source = SampleSource::new(&platform, &config);
        let core = MonitorCore {
            store: RefCell::new(MetricStore::new(config.max_samples)),
            operations: RefCell::new(OperationLog::new(config.max_operations)),
            subscribers: RefCell::new(Vec::new()),
            next_subscriber: Cell::new(0),
            subscriber_failures: Cell::new(0),
            active: Cell::new(false),
            clock: platform.clock,
            document: platform.document,
            source,
            config,
        };
        Self {
            core: Rc::new(core),
        }
    }

    /// Begin platform sampling. Does nothing when already active.
    pub fn start(&self) {
        if self.core.active.get() {
            tracing::trace!(target: "perf::monitor", "start ignored, already active");
            return;
        }
        self.core.active.set(true);

        let core: Weak<MonitorCore> = Rc::downgrade(&self.core);
        self.core.source.activate(core);
        tracing::debug!(target: "perf::monitor", "monitor started");
    }

    /// Stop platform sampling, keeping recorded data. Does nothing when inactive.
    pub fn stop(&self) {
        if !self.core.active.get() {
            tracing::trace!(target: "perf::monitor", "stop ignored, not active");
            return;
        }
        self.core.active.set(false);
        self.core.source.deactivate();
        tracing::debug!(target: "perf::monitor", "monitor stopped");
    }

    pub fn is_active(&self) -> bool {
        self.core.active.get()
    }

    /// Record a sample, in any lifecycle state, and notify subscribers.
    pub fn record(&self, key: MetricKey, value: f64) {
        self.core.ingest(&[(key, value)]);
    }

    /// Log a timed operation stamped with the platform clock and notify subscribers.
    pub fn record_operation(&self, label: &str, duration_ms: f64) {
        let operation = Operation {
            label: label.to_string(),
            duration: duration_ms,
            timestamp: self.core.clock.now_ms(),
        };
        self.core.operations.borrow_mut().push(operation);

        tracing::trace!(
            target: "perf::operation",
            label,
            duration_ms,
            "operation recorded"
        );
        self.core.notify();
    }

    /// Statistics for `key`, `None` when it has no samples.
    pub fn get_stats(&self, key: MetricKey) -> Option<MetricStats> {
        self.core.store.borrow().stats(key)
    }

    pub fn get_snapshot(&self) -> PerfSnapshot {
        self.core.snapshot()
    }

    /// Register `callback` for a snapshot after every recording.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PerfSnapshot) + 'static,
    {
        let id = self.core.next_subscriber.get();
        self.core.next_subscriber.set(id + 1);
        self.core.subscribers.borrow_mut().push(Rc::new(SubscriberSlot {
            id,
            callback: Rc::new(callback),
            live: Cell::new(true),
        }));

        let core = Rc::downgrade(&self.core);
        Subscription::new(move || {
            if let Some(core) = core.upgrade() {
                core.remove_subscriber(id);
            }
        })
    }

    /// Drop all samples and operations. Lifecycle and subscribers are kept.
    pub fn clear(&self) {
        self.core.store.borrow_mut().clear();
        self.core.operations.borrow_mut().clear();
        tracing::debug!(target: "perf::monitor", "monitor cleared");
        self.core.notify();
    }

    /// Start timing an operation that is logged when the timer drops.
    pub fn time(&self, label: impl Into<String>) -> OperationTimer<'_> {
        OperationTimer::start(self, label)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.core.config
    }

    pub fn sampling_status(&self) -> SamplingStatus {
        self.core.source.status()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.borrow().len()
    }

    /// Number of subscriber callbacks that panicked so far.
    pub fn subscriber_failures(&self) -> u64 {
        self.core.subscriber_failures.get()
    }
}

impl fmt::Debug for LiveMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMonitor")
            .field("active", &self.is_active())
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}

impl PerfMonitor for LiveMonitor {
    fn start(&self) {
        LiveMonitor::start(self)
    }

    fn stop(&self) {
        LiveMonitor::stop(self)
    }

    fn is_active(&self) -> bool {
        LiveMonitor::is_active(self)
    }

    fn clear(&self) {
        LiveMonitor::clear(self)
    }

    fn record(&self, key: MetricKey, value: f64) {
        LiveMonitor::record(self, key, value)
    }

    fn record_operation(&self, label: &str, duration_ms: f64) {
        LiveMonitor::record_operation(self, label, duration_ms)
    }

    fn get_stats(&self, key: MetricKey) -> Option<MetricStats> {
        LiveMonitor::get_stats(self, key)
    }

    fn get_snapshot(&self) -> PerfSnapshot {
        LiveMonitor::get_snapshot(self)
    }

    fn subscribe(&self, callback: SubscriberFn) -> Subscription {
        LiveMonitor::subscribe(self, callback)
    }
}
