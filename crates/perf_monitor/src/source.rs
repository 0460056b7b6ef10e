//! Sample source: turns platform frames and entries into metric samples
//!
//! Two independent feeds:
//!
//! - a frame loop that emits one `tick` sample (time since the previous
//!   frame) per frame and one `fps` sample per window;
//! - an entry observer that forwards slow interactions and long tasks.
//!
//! Both facilities are probed once when the source is built. A missing or
//! failing facility is logged and skipped; manual recording is unaffected.

use crate::buffer::MetricKey;
use crate::config::MonitorConfig;
use crate::platform::{
    Capability, EntryObserverApi, EntrySink, EntryType, FrameHandle, FrameScheduler,
    ObserverConnection, PerformanceEntry, Platform,
};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Receiver of samples produced by the source.
pub(crate) trait SampleSink {
    /// Record a batch of samples and notify once.
    fn ingest(&self, samples: &[(MetricKey, f64)]);
}

/// Entry types the source asks the platform for.
const WANTED_ENTRY_TYPES: [EntryType; 2] = [EntryType::Event, EntryType::LongTask];

/// Observer facility together with the entry types it will be asked for.
pub struct ObserverBinding {
    api: Rc<dyn EntryObserverApi>,
    entry_types: Vec<EntryType>,
}

impl ObserverBinding {
    pub fn entry_types(&self) -> &[EntryType] {
        &self.entry_types
    }
}

/// What the source could wire up, as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingStatus {
    /// Frame sampling is supported by the platform
    pub frames: bool,
    /// Entry observation is supported by the platform
    pub entries: bool,
    /// An entry observation is currently connected
    pub observing: bool,
    /// Reasons for any unsupported facility
    pub unavailable: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    window_ms: f64,
    inp_ms: f64,
    long_task_ms: f64,
}

/// Samples produced by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameSample {
    /// Time since the previous frame, in milliseconds
    tick: f64,
    /// Frame rate of the window this frame closed, if any
    fps: Option<f64>,
}

impl FrameSample {
    fn samples(&self) -> Vec<(MetricKey, f64)> {
        let mut samples = vec![(MetricKey::Tick, self.tick)];
        if let Some(fps) = self.fps {
            samples.push((MetricKey::Fps, fps));
        }
        samples
    }
}

/// Frame counter over one sampling window.
#[derive(Debug, Default)]
struct FrameWindow {
    start: Option<f64>,
    last: f64,
    frames: u32,
}

impl FrameWindow {
    /// Count one frame at `timestamp`.
    ///
    /// The first frame only anchors the window. Every later frame yields its
    /// own frame time, plus the window's fps when the window is complete.
    fn tick(&mut self, timestamp: f64, window_ms: f64) -> Option<FrameSample> {
        let Some(start) = self.start else {
            self.start = Some(timestamp);
            self.last = timestamp;
            self.frames = 0;
            return None;
        };

        let tick = timestamp - self.last;
        self.last = timestamp;
        self.frames += 1;

        let elapsed = timestamp - start;
        let fps = if elapsed >= window_ms {
            let fps = (f64::from(self.frames) * 1000.0 / elapsed).round();
            self.start = Some(timestamp);
            self.frames = 0;
            Some(fps)
        } else {
            None
        };

        Some(FrameSample { tick, fps })
    }

    fn reset(&mut self) {
        self.start = None;
        self.last = 0.0;
        self.frames = 0;
    }
}

#[derive(Default)]
struct SourceState {
    running: bool,
    session: u64,
    pending_frame: Option<FrameHandle>,
    connection: Option<Box<dyn ObserverConnection>>,
    window: FrameWindow,
}

impl SourceState {
    fn is_current(&self, session: u64) -> bool {
        self.running && self.session == session
    }
}

/// Everything one frame callback needs to measure and reschedule itself.
struct FrameLoop {
    scheduler: Rc<dyn FrameScheduler>,
    state: Weak<RefCell<SourceState>>,
    sink: Weak<dyn SampleSink>,
    session: u64,
    window_ms: f64,
}

impl FrameLoop {
    fn schedule(self: Rc<Self>) {
        let scheduler = Rc::clone(&self.scheduler);
        let state = self.state.clone();
        let handle = scheduler.schedule(Box::new(move |timestamp: f64| self.on_frame(timestamp)));
        if let Some(state) = state.upgrade() {
            state.borrow_mut().pending_frame = Some(handle);
        }
    }

    fn on_frame(self: Rc<Self>, timestamp: f64) {
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let sample = {
            let mut state = state.borrow_mut();
            if !state.is_current(self.session) {
                return;
            }
            state.pending_frame = None;
            state.window.tick(timestamp, self.window_ms)
        };

        if let Some(sample) = sample {
            if let Some(sink) = self.sink.upgrade() {
                sink.ingest(&sample.samples());
            }
        }

        // A subscriber may have stopped the monitor while we were notifying
        let still_current = state.borrow().is_current(self.session);
        if still_current {
            self.schedule();
        }
    }
}

/// Platform-driven sample producer.
pub struct SampleSource {
    frames: Capability<Rc<dyn FrameScheduler>>,
    observer: Capability<ObserverBinding>,
    thresholds: Thresholds,
    state: Rc<RefCell<SourceState>>,
}

impl SampleSource {
    /// Probe the platform once and build an inactive source.
    pub fn new(platform: &Platform, config: &MonitorConfig) -> Self {
        let frames = probe_frames(platform.frames.clone());
        let observer = probe_observer(platform.observer.clone());

        for reason in [frames.reason(), observer.reason()].into_iter().flatten() {
            tracing::warn!(target: "perf::source", reason, "sampling feature unavailable");
        }

        Self {
            frames,
            observer,
            thresholds: Thresholds {
                window_ms: config.sample_window_ms,
                inp_ms: config.inp_threshold_ms,
                long_task_ms: config.long_task_threshold_ms,
            },
            state: Rc::new(RefCell::new(SourceState::default())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Begin sampling into `sink`. Returns `false` if already running.
    pub(crate) fn activate(&self, sink: Weak<dyn SampleSink>) -> bool {
        let session = {
            let mut state = self.state.borrow_mut();
            if state.running {
                return false;
            }
            state.running = true;
            state.session += 1;
            state.window.reset();
            state.session
        };

        if let Some(scheduler) = self.frames.available() {
            Rc::new(FrameLoop {
                scheduler: Rc::clone(scheduler),
                state: Rc::downgrade(&self.state),
                sink: sink.clone(),
                session,
                window_ms: self.thresholds.window_ms,
            })
            .schedule();
        }

        if let Some(binding) = self.observer.available() {
            self.connect_observer(binding, sink, session);
        }

        tracing::debug!(
            target: "perf::source",
            session,
            frames = self.frames.is_available(),
            observing = self.state.borrow().connection.is_some(),
            "sampling started"
        );
        true
    }

    /// Stop sampling. Returns `false` if it was not running.
    pub fn deactivate(&self) -> bool {
        let (pending, connection) = {
            let mut state = self.state.borrow_mut();
            if !state.running {
                return false;
            }
            state.running = false;
            (state.pending_frame.take(), state.connection.take())
        };

        if let (Some(handle), Some(scheduler)) = (pending, self.frames.available()) {
            scheduler.cancel(handle);
        }
        if let Some(mut connection) = connection {
            connection.disconnect();
        }

        tracing::debug!(target: "perf::source", "sampling stopped");
        true
    }

    pub fn status(&self) -> SamplingStatus {
        SamplingStatus {
            frames: self.frames.is_available(),
            entries: self.observer.is_available(),
            observing: self.state.borrow().connection.is_some(),
            unavailable: [self.frames.reason(), self.observer.reason()]
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect(),
        }
    }

    fn connect_observer(&self, binding: &ObserverBinding, sink: Weak<dyn SampleSink>, session: u64) {
        let state = Rc::downgrade(&self.state);
        let thresholds = self.thresholds;
        let entry_sink: EntrySink = Rc::new(move |entries: &[PerformanceEntry]| {
            let Some(state) = state.upgrade() else {
                return;
            };
            if !state.borrow().is_current(session) {
                return;
            }

            let samples: Vec<(MetricKey, f64)> = entries
                .iter()
                .filter_map(|entry| classify(entry, &thresholds))
                .collect();
            if samples.is_empty() {
                return;
            }
            if let Some(sink) = sink.upgrade() {
                sink.ingest(&samples);
            }
        });

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            binding.api.observe(&binding.entry_types, entry_sink)
        }));

        match attempt {
            Ok(Ok(connection)) => {
                self.state.borrow_mut().connection = Some(connection);
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    target: "perf::source",
                    error = %err,
                    "entry observer failed to start, continuing without it"
                );
            }
            Err(_) => {
                tracing::warn!(
                    target: "perf::source",
                    "entry observer panicked during setup, continuing without it"
                );
            }
        }
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Map a qualifying entry to the sample it produces.
fn classify(entry: &PerformanceEntry, thresholds: &Thresholds) -> Option<(MetricKey, f64)> {
    match entry.entry_type {
        EntryType::Event if entry.duration > thresholds.inp_ms => {
            Some((MetricKey::Inp, entry.duration))
        }
        EntryType::LongTask if entry.duration > thresholds.long_task_ms => {
            Some((MetricKey::LongTask, entry.duration))
        }
        _ => None,
    }
}

fn probe_frames(scheduler: Option<Rc<dyn FrameScheduler>>) -> Capability<Rc<dyn FrameScheduler>> {
    match scheduler {
        Some(scheduler) => Capability::Available(scheduler),
        None => Capability::Unavailable("frame scheduling not supported".to_string()),
    }
}

fn probe_observer(api: Option<Rc<dyn EntryObserverApi>>) -> Capability<ObserverBinding> {
    let Some(api) = api else {
        return Capability::Unavailable("entry observation not supported".to_string());
    };

    let supported = match panic::catch_unwind(AssertUnwindSafe(|| api.supported_entry_types())) {
        Ok(Ok(supported)) => supported,
        Ok(Err(err)) => return Capability::Unavailable(err.to_string()),
        Err(_) => {
            return Capability::Unavailable("entry type probe panicked".to_string());
        }
    };

    let entry_types: Vec<EntryType> = WANTED_ENTRY_TYPES
        .into_iter()
        .filter(|wanted| supported.contains(wanted))
        .collect();
    if entry_types.is_empty() {
        return Capability::Unavailable("no supported entry types".to_string());
    }

    Capability::Available(ObserverBinding { api, entry_types })
}
