//! End-to-end tests for the performance monitor
//!
//! These drive a monitor through hand-driven platform facilities: frames are
//! fired explicitly and observer entries are emitted on demand, so every
//! sample count below is exact.

use perf_monitor::platform::manual::{
    ManualEntryObserver, ManualFrameScheduler, ObserverFault, StaticDocument,
};
use perf_monitor::platform::{EntryType, PerformanceEntry};
use perf_monitor::{
    BuildFlags, LiveMonitor, MetricKey, MonitorConfig, PerfContext, PerfMonitor, PerfSnapshot,
    Platform,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Monitor wired to manual frames, a manual observer and a static document.
struct Harness {
    monitor: LiveMonitor,
    frames: Rc<ManualFrameScheduler>,
    observer: Rc<ManualEntryObserver>,
    document: Rc<StaticDocument>,
}

impl Harness {
    fn new(config: MonitorConfig) -> Self {
        Self::with_observer(config, ManualEntryObserver::new())
    }

    fn with_observer(config: MonitorConfig, observer: ManualEntryObserver) -> Self {
        init_tracing();
        let frames = Rc::new(ManualFrameScheduler::new());
        let observer = Rc::new(observer);
        let document = Rc::new(StaticDocument::new(128, Some(32 * 1024 * 1024)));
        let platform = Platform::headless()
            .with_frames(frames.clone())
            .with_observer(observer.clone())
            .with_document(document.clone());
        let monitor = LiveMonitor::new(config, platform).expect("valid config");

        Self {
            monitor,
            frames,
            observer,
            document,
        }
    }

    /// Fire `count` frames `interval` ms apart, starting at `from`.
    fn run_frames(&self, from: f64, interval: f64, count: usize) {
        for i in 0..count {
            self.frames.fire(from + i as f64 * interval);
        }
    }
}

#[test]
fn capacity_keeps_newest_samples() {
    let monitor = LiveMonitor::new(MonitorConfig::default().with_max_samples(256), Platform::headless()).unwrap();

    for value in 1..=300 {
        monitor.record(MetricKey::Fps, value as f64);
    }

    let stats = monitor.get_stats(MetricKey::Fps).unwrap();
    assert_eq!(stats.count, 256);
    assert_eq!(stats.min, 45.0);
    assert_eq!(stats.max, 300.0);
}

#[test]
fn inp_statistics_use_nearest_rank() {
    let monitor = LiveMonitor::headless();

    for value in [100.0, 75.0, 120.0] {
        monitor.record(MetricKey::Inp, value);
    }

    let stats = monitor.get_stats(MetricKey::Inp).unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.min, 75.0);
    assert_eq!(stats.max, 120.0);
    assert!((stats.avg - 98.33).abs() < 0.01, "avg was {}", stats.avg);
    assert_eq!(stats.p50, 100.0);
    assert_eq!(stats.p95, 120.0);
    assert_eq!(stats.p99, 120.0);
}

#[test]
fn operation_log_keeps_most_recent() {
    let config = MonitorConfig::default().with_max_operations(5);
    let monitor = LiveMonitor::new(config, Platform::headless()).unwrap();

    for i in 0..10 {
        monitor.record_operation(&format!("op-{}", i), i as f64);
    }

    let labels: Vec<String> = monitor
        .get_snapshot()
        .operations
        .into_iter()
        .map(|op| op.label)
        .collect();
    assert_eq!(labels, vec!["op-5", "op-6", "op-7", "op-8", "op-9"]);
}

#[test]
fn failing_observer_degrades_to_frames() {
    for fault in [ObserverFault::Observe, ObserverFault::ObservePanic] {
        let harness = Harness::with_observer(MonitorConfig::default(), ManualEntryObserver::faulty(fault));

        harness.monitor.start();
        assert!(harness.monitor.is_active());
        assert!(!harness.monitor.sampling_status().observing);

        harness.monitor.record(MetricKey::Fps, 60.0);
        assert_eq!(harness.monitor.get_stats(MetricKey::Fps).unwrap().count, 1);

        // Frame sampling is unaffected
        assert_eq!(harness.frames.pending(), 1);
    }
}

#[test]
fn missing_observer_degrades_to_frames() {
    let frames = Rc::new(ManualFrameScheduler::new());
    let platform = Platform::headless().with_frames(frames.clone());
    let monitor = LiveMonitor::new(MonitorConfig::default(), platform).unwrap();

    let status = monitor.sampling_status();
    assert!(status.frames);
    assert!(!status.entries);
    assert_eq!(status.unavailable, vec!["entry observation not supported".to_string()]);

    monitor.start();
    monitor.record(MetricKey::Fps, 60.0);
    assert_eq!(monitor.get_stats(MetricKey::Fps).unwrap().count, 1);
}

#[test]
fn disabled_profiling_uses_noop() {
    let context = PerfContext::new(
        BuildFlags::new(false, true),
        MonitorConfig::default(),
        Platform::headless(),
    )
    .unwrap();
    assert!(!context.is_live());

    let monitor = context.monitor();
    monitor.start();
    for i in 0..3 {
        monitor.record(MetricKey::Fps, 60.0);
        monitor.record_operation(&format!("op-{}", i), 1.0);
    }

    assert!(!monitor.is_active());
    assert!(monitor.get_stats(MetricKey::Fps).is_none());
    assert!(monitor.get_snapshot().operations.is_empty());

    {
        let _timer = context.time("ignored");
    }
    assert!(context.shared().get_snapshot().operations.is_empty());
}

#[test]
fn release_build_flags_use_noop() {
    let context = PerfContext::new(
        BuildFlags::new(true, false),
        MonitorConfig::default(),
        Platform::headless(),
    )
    .unwrap();
    assert!(!context.is_live());
    assert!(context.live().is_none());
}

#[test]
fn frame_sampling_records_fps_and_tick() {
    let harness = Harness::new(MonitorConfig::default());
    harness.monitor.start();

    // Anchor at 0, then 50 frames 20ms apart closes one 1000ms window
    harness.run_frames(0.0, 20.0, 51);

    assert_eq!(harness.monitor.get_stats(MetricKey::Fps).unwrap().count, 1);
    let snapshot = harness.monitor.get_snapshot();
    assert_eq!(snapshot.fps, 50.0);
    assert_eq!(snapshot.frame_time, 20.0);

    // One frame time per frame after the anchor
    let tick = snapshot.stats_for(MetricKey::Tick).unwrap();
    assert_eq!(tick.count, 50);
    assert_eq!(tick.min, 20.0);
    assert_eq!(tick.max, 20.0);
}

#[test]
fn slow_frame_shows_in_tick_distribution() {
    let harness = Harness::new(MonitorConfig::default());
    harness.monitor.start();

    // 10 frames 16ms apart, one 200ms frame, then 16ms frames past 1100ms
    harness.run_frames(0.0, 16.0, 11);
    harness.run_frames(360.0, 16.0, 48);

    let tick = harness.monitor.get_stats(MetricKey::Tick).unwrap();
    assert_eq!(tick.count, 58);
    assert_eq!(tick.min, 16.0);
    assert_eq!(tick.max, 200.0);
    assert_eq!(tick.p50, 16.0);
    assert_eq!(harness.monitor.get_stats(MetricKey::Fps).unwrap().count, 1);
}

#[test]
fn double_start_does_not_double_samples() {
    let once = Harness::new(MonitorConfig::default());
    once.monitor.start();
    once.run_frames(0.0, 20.0, 101);

    let twice = Harness::new(MonitorConfig::default());
    twice.monitor.start();
    twice.monitor.start();
    assert_eq!(twice.frames.pending(), 1);
    twice.run_frames(0.0, 20.0, 101);

    assert!(twice.monitor.is_active());
    assert_eq!(twice.observer.connection_count(), 1);
    assert_eq!(
        once.monitor.get_stats(MetricKey::Fps),
        twice.monitor.get_stats(MetricKey::Fps)
    );
    assert_eq!(
        once.monitor.get_stats(MetricKey::Tick),
        twice.monitor.get_stats(MetricKey::Tick)
    );
    assert_eq!(twice.monitor.get_stats(MetricKey::Fps).unwrap().count, 2);
    assert_eq!(twice.monitor.get_snapshot().fps, 50.0);
}

#[test]
fn no_sampling_while_inactive() {
    let harness = Harness::new(MonitorConfig::default());
    assert_eq!(harness.frames.pending(), 0);
    assert_eq!(harness.observer.connection_count(), 0);

    harness.monitor.start();
    harness.run_frames(0.0, 20.0, 30);
    harness.monitor.stop();

    assert_eq!(harness.frames.pending(), 0);
    assert_eq!(harness.observer.connection_count(), 0);

    harness.run_frames(600.0, 20.0, 60);
    harness.observer.emit(&[PerformanceEntry::new(EntryType::LongTask, 300.0, 700.0)]);

    assert!(harness.monitor.get_stats(MetricKey::Fps).is_none());
    assert!(harness.monitor.get_stats(MetricKey::LongTask).is_none());
}

#[test]
fn restart_begins_a_fresh_window() {
    let harness = Harness::new(MonitorConfig::default());
    harness.monitor.start();
    harness.run_frames(0.0, 20.0, 40);
    harness.monitor.stop();

    harness.monitor.start();
    // 40 frames before the stop must not count toward this window
    harness.run_frames(5000.0, 10.0, 101);

    let stats = harness.monitor.get_stats(MetricKey::Fps).unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.max, 100.0);

    // The gap across the restart is not a frame
    let tick = harness.monitor.get_stats(MetricKey::Tick).unwrap();
    assert_eq!(tick.count, 39 + 100);
    assert_eq!(tick.max, 20.0);
}

#[test]
fn observer_entries_feed_snapshot() {
    let harness = Harness::new(MonitorConfig::default());
    harness.monitor.start();

    harness.observer.emit(&[
        PerformanceEntry::new(EntryType::Event, 24.0, 10.0),
        PerformanceEntry::new(EntryType::Event, 180.0, 20.0),
        PerformanceEntry::new(EntryType::LongTask, 120.0, 30.0),
        PerformanceEntry::new(EntryType::LongTask, 65.0, 40.0),
    ]);

    let snapshot = harness.monitor.get_snapshot();
    assert_eq!(snapshot.inp, Some(180.0));
    assert_eq!(snapshot.long_task_count, 2);
    assert_eq!(snapshot.dom_nodes, 128);
    assert_eq!(snapshot.memory_mb, Some(32.0));

    harness.document.set_elements(512);
    assert_eq!(harness.monitor.get_snapshot().dom_nodes, 512);
}

#[test]
fn subscribers_see_every_record_until_unsubscribed() {
    let harness = Harness::new(MonitorConfig::default());
    let seen: Rc<RefCell<Vec<PerfSnapshot>>> = Rc::new(RefCell::new(Vec::new()));

    let s = Rc::clone(&seen);
    let subscription = harness
        .monitor
        .subscribe(move |snapshot| s.borrow_mut().push(snapshot.clone()));

    harness.monitor.record(MetricKey::Inp, 70.0);
    harness.monitor.record_operation("save", 12.0);
    subscription.unsubscribe();
    harness.monitor.record(MetricKey::Inp, 90.0);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].inp, Some(70.0));
    assert!(seen[0].operations.is_empty());
    assert_eq!(seen[1].operations[0].label, "save");
}

#[test]
fn platform_samples_notify_once_per_frame_and_batch() {
    let harness = Harness::new(MonitorConfig::default());
    let calls = Rc::new(Cell::new(0));
    let c = Rc::clone(&calls);
    let _subscription = harness.monitor.subscribe(move |_| c.set(c.get() + 1));

    harness.monitor.start();
    harness.run_frames(0.0, 20.0, 51);
    harness.observer.emit(&[
        PerformanceEntry::new(EntryType::Event, 90.0, 1.0),
        PerformanceEntry::new(EntryType::LongTask, 90.0, 2.0),
    ]);

    // 50 frames after the anchor, one observer batch
    assert_eq!(calls.get(), 51);
}

#[test]
fn trait_object_subscription() {
    let context = PerfContext::new(
        BuildFlags::new(true, true),
        MonitorConfig::default(),
        Platform::headless(),
    )
    .unwrap();
    let monitor = context.shared();

    let calls = Rc::new(Cell::new(0));
    let c = Rc::clone(&calls);
    let subscription = monitor.subscribe(Box::new(move |_: &PerfSnapshot| c.set(c.get() + 1)));

    monitor.record(MetricKey::Tick, 16.7);
    subscription.unsubscribe();
    monitor.record(MetricKey::Tick, 16.7);

    assert_eq!(calls.get(), 1);
}

#[test]
fn snapshot_is_detached_from_later_writes() {
    let monitor = LiveMonitor::headless();
    monitor.record(MetricKey::Fps, 30.0);
    let before = monitor.get_snapshot();

    monitor.record(MetricKey::Fps, 60.0);
    monitor.record_operation("late", 1.0);

    assert_eq!(before.fps, 30.0);
    assert!(before.operations.is_empty());
    assert_eq!(monitor.get_snapshot().fps, 60.0);
}
