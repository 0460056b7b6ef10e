//! Bounded per-metric sample history

use crate::error::PerfError;
use crate::stats::MetricStats;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Kind of signal a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKey {
    /// Frames per second over one sampling window
    Fps,
    /// Time between consecutive frames, in milliseconds
    Tick,
    /// Slow interaction delay, in milliseconds
    Inp,
    /// Long main-thread task duration, in milliseconds
    LongTask,
}

impl MetricKey {
    /// Every tracked key, in snapshot order.
    pub const ALL: [MetricKey; 4] = [
        MetricKey::Fps,
        MetricKey::Tick,
        MetricKey::Inp,
        MetricKey::LongTask,
    ];

    /// Wire name of this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Fps => "fps",
            MetricKey::Tick => "tick",
            MetricKey::Inp => "inp",
            MetricKey::LongTask => "longtask",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = PerfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| PerfError::UnknownMetric(s.to_string()))
    }
}

/// Fixed-capacity FIFO of samples.
///
/// Once full, each push evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl MetricBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when at capacity.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Summary statistics of the retained samples.
    pub fn stats(&self) -> Option<MetricStats> {
        MetricStats::from_samples(self.iter())
    }
}

/// One [`MetricBuffer`] per metric key, created on first use.
#[derive(Debug, Clone)]
pub struct MetricStore {
    buffers: HashMap<MetricKey, MetricBuffer>,
    max_samples: usize,
}

impl MetricStore {
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_samples,
        }
    }

    /// Record a sample for `key`.
    pub fn record(&mut self, key: MetricKey, value: f64) {
        let max_samples = self.max_samples;
        self.buffers
            .entry(key)
            .or_insert_with(|| MetricBuffer::new(max_samples))
            .push(value);

        tracing::trace!(
            target: "perf::buffer",
            metric = key.as_str(),
            value = value,
            "sample recorded"
        );
    }

    pub fn buffer(&self, key: MetricKey) -> Option<&MetricBuffer> {
        self.buffers.get(&key)
    }

    /// Statistics for `key`, `None` when nothing is recorded.
    pub fn stats(&self, key: MetricKey) -> Option<MetricStats> {
        self.buffers.get(&key).and_then(MetricBuffer::stats)
    }

    pub fn latest(&self, key: MetricKey) -> Option<f64> {
        self.buffers.get(&key).and_then(MetricBuffer::latest)
    }

    /// Number of retained samples for `key`.
    pub fn len(&self, key: MetricKey) -> usize {
        self.buffers.get(&key).map_or(0, MetricBuffer::len)
    }

    /// Empty every buffer.
    pub fn clear(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }
}
