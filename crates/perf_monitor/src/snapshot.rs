//! Point-in-time view of monitor state

use crate::buffer::MetricKey;
use crate::error::PerfResult;
use crate::operations::Operation;
use crate::stats::MetricStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable aggregate handed to callers and subscribers.
///
/// Built fresh for every query and every notification; holding one never
/// observes later recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSnapshot {
    /// Latest frames-per-second sample, 0 before the first window completes
    pub fps: f64,
    /// Frame time implied by `fps`, in milliseconds
    pub frame_time: f64,
    /// Live document elements at snapshot time
    pub dom_nodes: usize,
    /// Heap in use, in megabytes, when the platform reports it
    #[serde(rename = "memoryMB")]
    pub memory_mb: Option<f64>,
    /// Latest slow-interaction sample
    pub inp: Option<f64>,
    /// Retained long-task samples
    pub long_task_count: usize,
    /// Statistics per tracked key
    pub stats: BTreeMap<MetricKey, Option<MetricStats>>,
    /// Most recent operations, oldest first
    pub operations: Vec<Operation>,
}

impl PerfSnapshot {
    /// Zeroed snapshot with every tracked key present and empty.
    pub fn empty() -> Self {
        Self {
            fps: 0.0,
            frame_time: 0.0,
            dom_nodes: 0,
            memory_mb: None,
            inp: None,
            long_task_count: 0,
            stats: MetricKey::ALL.into_iter().map(|key| (key, None)).collect(),
            operations: Vec::new(),
        }
    }

    /// Statistics for `key`, if any samples were retained.
    pub fn stats_for(&self, key: MetricKey) -> Option<&MetricStats> {
        self.stats.get(&key).and_then(Option::as_ref)
    }

    /// Serialize for UI consumers.
    pub fn to_json(&self) -> PerfResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Default for PerfSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Frame time in milliseconds for a frame rate, 0 when no rate is known.
pub fn frame_time_for(fps: f64) -> f64 {
    if fps > 0.0 {
        1000.0 / fps
    } else {
        0.0
    }
}
