//! Platform contracts the monitor samples from
//!
//! The monitor never talks to a windowing system or browser directly. A host
//! hands it a [`Platform`] bundle; every facility except the clock is
//! optional, and a missing facility only narrows what gets sampled.
//!
//! The [`manual`] module provides hand-driven implementations for headless
//! hosts and deterministic tests.

use crate::error::PerfResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

// =============================================================================
// Frame scheduling
// =============================================================================

/// Callback run once before the next repaint, given a monotonic timestamp in ms.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Handle identifying one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// "Run before next repaint" primitive.
pub trait FrameScheduler {
    /// Schedule `callback` for the next frame.
    fn schedule(&self, callback: FrameCallback) -> FrameHandle;

    /// Cancel a callback that has not run yet. Unknown handles are ignored.
    fn cancel(&self, handle: FrameHandle);
}

// =============================================================================
// Entry observation
// =============================================================================

/// Kind of performance entry delivered by an [`EntryObserverApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Input event timing
    Event,
    /// Main-thread task over the platform's long-task limit
    LongTask,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Event => "event",
            EntryType::LongTask => "longtask",
        }
    }
}

/// One observed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub entry_type: EntryType,
    /// Duration in milliseconds
    pub duration: f64,
    /// Start time on the platform clock, in milliseconds
    pub start_time: f64,
}

impl PerformanceEntry {
    pub fn new(entry_type: EntryType, duration: f64, start_time: f64) -> Self {
        Self {
            entry_type,
            duration,
            start_time,
        }
    }
}

/// Receiver for batches of observed entries.
pub type EntrySink = Rc<dyn Fn(&[PerformanceEntry])>;

/// Live observation that can be torn down.
pub trait ObserverConnection {
    /// Stop delivering entries. Calling it again is harmless.
    fn disconnect(&mut self);
}

/// Event-observation facility.
pub trait EntryObserverApi {
    /// Entry types this platform can deliver.
    fn supported_entry_types(&self) -> PerfResult<Vec<EntryType>>;

    /// Begin delivering entries of `entry_types` to `sink`.
    fn observe(
        &self,
        entry_types: &[EntryType],
        sink: EntrySink,
    ) -> PerfResult<Box<dyn ObserverConnection>>;
}

// =============================================================================
// Document and clock
// =============================================================================

/// Read-only accessors queried when a snapshot is assembled.
pub trait DocumentInspector {
    /// Number of live elements in the document.
    fn element_count(&self) -> usize;

    /// Heap in use, when the platform exposes it.
    fn memory_used_bytes(&self) -> Option<u64> {
        None
    }
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// [`Clock`] backed by [`Instant`], measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

// =============================================================================
// Capability
// =============================================================================

/// Result of probing an optional platform facility.
pub enum Capability<T> {
    /// The facility is present and usable
    Available(T),
    /// The facility is absent or failed its probe
    Unavailable(String),
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Capability::Available(inner) => Some(inner),
            Capability::Unavailable(_) => None,
        }
    }

    /// Why the facility is unavailable.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable(reason) => Some(reason.as_str()),
        }
    }
}

impl<T> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

// =============================================================================
// Platform bundle
// =============================================================================

/// Facilities a host offers to the monitor.
#[derive(Clone)]
pub struct Platform {
    pub frames: Option<Rc<dyn FrameScheduler>>,
    pub observer: Option<Rc<dyn EntryObserverApi>>,
    pub document: Option<Rc<dyn DocumentInspector>>,
    pub clock: Rc<dyn Clock>,
}

impl Platform {
    /// Only a monotonic clock; everything else must be recorded manually.
    pub fn headless() -> Self {
        Self {
            frames: None,
            observer: None,
            document: None,
            clock: Rc::new(MonotonicClock::new()),
        }
    }

    pub fn with_frames(mut self, frames: Rc<dyn FrameScheduler>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_observer(mut self, observer: Rc<dyn EntryObserverApi>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_document(mut self, document: Rc<dyn DocumentInspector>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::headless()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("frames", &self.frames.is_some())
            .field("observer", &self.observer.is_some())
            .field("document", &self.document.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Manual drivers
// =============================================================================

pub mod manual {
    //! Hand-driven platform facilities.

    use super::*;
    use crate::error::PerfError;
    use std::cell::{Cell, RefCell};

    /// Frame scheduler whose frames fire only when [`fire`](Self::fire) is called.
    #[derive(Default)]
    pub struct ManualFrameScheduler {
        pending: RefCell<Vec<(FrameHandle, FrameCallback)>>,
        next_id: Cell<u64>,
        cancelled: Cell<usize>,
    }

    impl ManualFrameScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Run every callback pending at call time with `timestamp`.
        ///
        /// Callbacks scheduled while firing wait for the next call. Returns
        /// the number of callbacks run.
        pub fn fire(&self, timestamp: f64) -> usize {
            let due = std::mem::take(&mut *self.pending.borrow_mut());
            let count = due.len();
            for (_, callback) in due {
                callback(timestamp);
            }
            count
        }

        /// Number of callbacks waiting for a frame.
        pub fn pending(&self) -> usize {
            self.pending.borrow().len()
        }

        /// Number of successful cancellations.
        pub fn cancelled(&self) -> usize {
            self.cancelled.get()
        }
    }

    impl FrameScheduler for ManualFrameScheduler {
        fn schedule(&self, callback: FrameCallback) -> FrameHandle {
            let handle = FrameHandle(self.next_id.get());
            self.next_id.set(handle.0 + 1);
            self.pending.borrow_mut().push((handle, callback));
            handle
        }

        fn cancel(&self, handle: FrameHandle) {
            let mut pending = self.pending.borrow_mut();
            let before = pending.len();
            pending.retain(|(h, _)| *h != handle);
            if pending.len() < before {
                self.cancelled.set(self.cancelled.get() + 1);
            }
        }
    }

    /// How a [`ManualEntryObserver`] misbehaves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ObserverFault {
        /// Probing supported entry types fails
        Probe,
        /// `observe()` returns an error
        Observe,
        /// `observe()` panics
        ObservePanic,
    }

    struct SinkSlot {
        sink: EntrySink,
        connected: Rc<Cell<bool>>,
    }

    /// Entry observer fed by [`emit`](Self::emit).
    pub struct ManualEntryObserver {
        supported: Vec<EntryType>,
        fault: Option<ObserverFault>,
        slots: RefCell<Vec<SinkSlot>>,
    }

    impl ManualEntryObserver {
        /// Supports both event and long-task entries.
        pub fn new() -> Self {
            Self::with_supported(vec![EntryType::Event, EntryType::LongTask])
        }

        pub fn with_supported(supported: Vec<EntryType>) -> Self {
            Self {
                supported,
                fault: None,
                slots: RefCell::new(Vec::new()),
            }
        }

        /// An observer that fails in the given way.
        pub fn faulty(fault: ObserverFault) -> Self {
            Self {
                fault: Some(fault),
                ..Self::new()
            }
        }

        /// Deliver `entries` to every connected sink.
        pub fn emit(&self, entries: &[PerformanceEntry]) {
            let sinks: Vec<EntrySink> = self
                .slots
                .borrow()
                .iter()
                .filter(|slot| slot.connected.get())
                .map(|slot| Rc::clone(&slot.sink))
                .collect();
            for sink in sinks {
                sink(entries);
            }
        }

        /// Number of observations not yet disconnected.
        pub fn connection_count(&self) -> usize {
            self.slots
                .borrow()
                .iter()
                .filter(|slot| slot.connected.get())
                .count()
        }
    }

    impl Default for ManualEntryObserver {
        fn default() -> Self {
            Self::new()
        }
    }

    struct ManualConnection {
        connected: Rc<Cell<bool>>,
    }

    impl ObserverConnection for ManualConnection {
        fn disconnect(&mut self) {
            self.connected.set(false);
        }
    }

    impl EntryObserverApi for ManualEntryObserver {
        fn supported_entry_types(&self) -> PerfResult<Vec<EntryType>> {
            if self.fault == Some(ObserverFault::Probe) {
                return Err(PerfError::FeatureUnavailable(
                    "entry type probe failed".to_string(),
                ));
            }
            Ok(self.supported.clone())
        }

        fn observe(
            &self,
            _entry_types: &[EntryType],
            sink: EntrySink,
        ) -> PerfResult<Box<dyn ObserverConnection>> {
            match self.fault {
                Some(ObserverFault::Observe) => {
                    return Err(PerfError::FeatureUnavailable(
                        "observer construction failed".to_string(),
                    ))
                }
                Some(ObserverFault::ObservePanic) => panic!("observer construction panicked"),
                _ => {}
            }
            let connected = Rc::new(Cell::new(true));
            let mut slots = self.slots.borrow_mut();
            slots.retain(|slot| slot.connected.get());
            slots.push(SinkSlot {
                sink,
                connected: Rc::clone(&connected),
            });
            Ok(Box::new(ManualConnection { connected }))
        }
    }

    /// Document with settable element count and memory reading.
    #[derive(Debug, Default)]
    pub struct StaticDocument {
        elements: Cell<usize>,
        memory_bytes: Cell<Option<u64>>,
    }

    impl StaticDocument {
        pub fn new(elements: usize, memory_bytes: Option<u64>) -> Self {
            Self {
                elements: Cell::new(elements),
                memory_bytes: Cell::new(memory_bytes),
            }
        }

        pub fn set_elements(&self, elements: usize) {
            self.elements.set(elements);
        }

        pub fn set_memory_bytes(&self, bytes: Option<u64>) {
            self.memory_bytes.set(bytes);
        }
    }

    impl DocumentInspector for StaticDocument {
        fn element_count(&self) -> usize {
            self.elements.get()
        }

        fn memory_used_bytes(&self) -> Option<u64> {
            self.memory_bytes.get()
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now: Cell<f64>,
    }

    impl ManualClock {
        pub fn new(start_ms: f64) -> Self {
            Self {
                now: Cell::new(start_ms),
            }
        }

        pub fn set(&self, ms: f64) {
            self.now.set(ms);
        }

        pub fn advance(&self, ms: f64) {
            self.now.set(self.now.get() + ms);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> f64 {
            self.now.get()
        }
    }


}
