//! Distribution statistics over a metric buffer

use serde::{Deserialize, Serialize};

/// Statistical summary of one metric's retained samples.
///
/// Every percentile is an observed sample (nearest rank), so the same input
/// always yields exactly the same values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Number of samples
    pub count: usize,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// 50th percentile
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

impl MetricStats {
    /// Calculate statistics from samples in arrival order.
    ///
    /// Returns `None` for an empty sample set.
    pub fn from_samples<I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sorted: Vec<f64> = samples.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p50: nearest_rank(&sorted, 50),
            p95: nearest_rank(&sorted, 95),
            p99: nearest_rank(&sorted, 99),
        })
    }
}

/// Select the nearest-rank percentile from ascending samples.
///
/// `index = ceil(percentile / 100 * n) - 1`, clamped to the slice. Integer
/// arithmetic keeps the rank exact.
pub fn nearest_rank(sorted: &[f64], percentile: u32) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let rank = (percentile as usize * n).div_ceil(100);
    sorted[rank.saturating_sub(1).min(n - 1)]
}
