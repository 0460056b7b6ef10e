//! Bounded log of labeled timed operations

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One timed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Caller-supplied label
    pub label: String,
    /// Duration in milliseconds
    pub duration: f64,
    /// Clock reading when the operation was recorded, in milliseconds
    pub timestamp: f64,
}

/// Operations in insertion order, oldest dropped first.
#[derive(Debug, Clone)]
pub struct OperationLog {
    entries: VecDeque<Operation>,
    max_operations: usize,
}

impl OperationLog {
    pub fn new(max_operations: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_operations),
            max_operations,
        }
    }

    /// Append an operation, dropping the oldest beyond capacity.
    pub fn push(&mut self, operation: Operation) {
        self.entries.push_back(operation);
        while self.entries.len() > self.max_operations {
            self.entries.pop_front();
        }
    }

    /// At most `limit` of the newest operations, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Operation> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(label: &str, timestamp: f64) -> Operation {
        Operation {
            label: label.to_string(),
            duration: 1.0,
            timestamp,
        }
    }

    #[test]
    fn test_log_drops_oldest() {
        let mut log = OperationLog::new(3);
        for i in 0..5 {
            log.push(op(&format!("op-{}", i), i as f64));
        }

        let labels: Vec<_> = log.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["op-2", "op-3", "op-4"]);
    }

    #[test]
    fn test_recent_is_bounded_view() {
        let mut log = OperationLog::new(50);
        for i in 0..20 {
            log.push(op(&format!("op-{}", i), i as f64));
        }

        let recent = log.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].label, "op-10");
        assert_eq!(recent[9].label, "op-19");
        assert_eq!(log.len(), 20);
    }

    #[test]
    fn test_recent_shorter_than_limit() {
        let mut log = OperationLog::new(50);
        log.push(op("only", 0.0));
        assert_eq!(log.recent(10).len(), 1);
        assert!(OperationLog::new(5).recent(10).is_empty());
    }

    #[test]
    fn test_log_clear() {
        let mut log = OperationLog::new(5);
        log.push(op("a", 0.0));
        log.clear();
        assert!(log.is_empty());
    }
}
