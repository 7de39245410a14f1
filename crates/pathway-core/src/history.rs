//! Linear undo/redo over whole-graph snapshots.

use crate::graph::CourseGraph;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Immutable copy of the graph at one committed step.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub graph: CourseGraph,
    pub timestamp: DateTime<Utc>,
}

impl HistorySnapshot {
    pub fn capture(graph: CourseGraph) -> Self {
        Self {
            graph,
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot stack with a cursor.
///
/// Never empty: it is seeded with the initial graph, so undo can always
/// return a valid graph. Recording after an undo drops the redo tail.
/// With `max_depth > 0` the oldest snapshots fall off the front.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    snapshots: VecDeque<HistorySnapshot>,
    cursor: usize,
    max_depth: usize,
}

impl HistoryManager {
    pub fn new(initial: CourseGraph, max_depth: usize) -> Self {
        let mut snapshots = VecDeque::new();
        snapshots.push_back(HistorySnapshot::capture(initial));
        Self {
            snapshots,
            cursor: 0,
            max_depth,
        }
    }

    /// Record the graph after a committed mutation.
    pub fn record(&mut self, graph: CourseGraph) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push_back(HistorySnapshot::capture(graph));
        if self.max_depth > 0 {
            while self.snapshots.len() > self.max_depth {
                self.snapshots.pop_front();
            }
        }
        self.cursor = self.snapshots.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&CourseGraph> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.snapshots[self.cursor].graph)
    }

    pub fn redo(&mut self) -> Option<&CourseGraph> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.snapshots[self.cursor].graph)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn current(&self) -> &HistorySnapshot {
        &self.snapshots[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshot is stored. The initial snapshot keeps this false.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
