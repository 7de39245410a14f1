//! Debounced, coalescing write scheduling.
//!
//! [`PersistenceCoordinator`] decides *when* a write happens; it never touches
//! the graph or the repository itself. Time is passed in explicitly so the
//! debounce rules can be driven by a test clock or by tokio timers alike.

use std::time::{Duration, Instant};

/// What the editing surface should show about durability.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    /// Everything committed so far has been written.
    #[default]
    Idle,
    /// Changes are waiting for the debounce timer or a queued save.
    Pending,
    /// A write is in flight.
    Saving,
    /// The last write failed. Cleared by the next successful write.
    Failed(String),
}

/// Why a write was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTrigger {
    Debounced,
    Explicit,
}

/// Timer-reset scheduler with at most one write in flight.
#[derive(Debug, Clone)]
pub struct PersistenceCoordinator {
    delay: Duration,
    deadline: Option<Instant>,
    immediate_requested: bool,
    in_flight: bool,
    /// Committed changes that no successful write has stored yet.
    unsaved: bool,
    last_error: Option<String>,
    completed_writes: u64,
}

impl PersistenceCoordinator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            immediate_requested: false,
            in_flight: false,
            unsaved: false,
            last_error: None,
            completed_writes: 0,
        }
    }

    /// (Re)start the debounce timer after a mutation.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
        self.unsaved = true;
    }

    /// Ask for a write as soon as nothing is in flight. Cancels the pending
    /// debounced write, which the explicit one supersedes.
    pub fn request_immediate(&mut self) {
        self.immediate_requested = true;
        self.deadline = None;
    }

    /// The write that should start now, if any. Does not start it.
    pub fn poll_due(&self, now: Instant) -> Option<WriteTrigger> {
        if self.in_flight {
            return None;
        }
        if self.immediate_requested {
            return Some(WriteTrigger::Explicit);
        }
        match self.deadline {
            Some(deadline) if deadline <= now => Some(WriteTrigger::Debounced),
            _ => None,
        }
    }

    /// Mark a write as started. The caller serializes the graph right after,
    /// so whatever was pending is covered by this write.
    pub fn begin_write(&mut self) {
        self.in_flight = true;
        self.immediate_requested = false;
        self.deadline = None;
        self.unsaved = false;
    }

    /// Mark the in-flight write as finished. Mutations made while it ran
    /// have already re-armed the timer through [`Self::schedule`]. A failed
    /// write leaves its changes unsaved; no retry is scheduled, but the next
    /// flush writes them again.
    pub fn finish_write(&mut self, result: Result<(), &str>) {
        self.in_flight = false;
        match result {
            Ok(()) => {
                self.last_error = None;
                self.completed_writes += 1;
            }
            Err(message) => {
                self.last_error = Some(message.to_string());
                self.unsaved = true;
            }
        }
    }

    /// When the timer fires, if a debounced write is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether some committed change is not known to be stored, including
    /// changes whose write failed.
    pub fn has_pending(&self) -> bool {
        self.unsaved || self.deadline.is_some() || self.immediate_requested
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn completed_writes(&self) -> u64 {
        self.completed_writes
    }

    pub fn status(&self) -> SaveStatus {
        if self.in_flight {
            SaveStatus::Saving
        } else if let Some(message) = &self.last_error {
            SaveStatus::Failed(message.clone())
        } else if self.has_pending() {
            SaveStatus::Pending
        } else {
            SaveStatus::Idle
        }
    }
}
