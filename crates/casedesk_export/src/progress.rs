//! Export progress stream.
//!
//! Events go out on a bounded channel with `try_send`. A full channel
//! drops the event and a closed one is ignored, so a slow or absent
//! consumer never holds up a task. Task bookkeeping lives elsewhere and
//! is never dropped with an event.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Snapshot of a run's progress. Consumers may see events coalesced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub total_tasks: usize,
    /// Never decreases within a run and never exceeds `total_tasks`.
    pub completed_tasks: usize,
    pub current_task: String,
    pub current_step: String,
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        self.completed_tasks >= self.total_tasks
    }

    /// Completed fraction in `0.0..=1.0`; an empty run counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            1.0
        } else {
            self.completed_tasks as f64 / self.total_tasks as f64
        }
    }
}

/// Bounded progress channel; capacity is at least 1.
pub fn progress_channel(
    capacity: usize,
) -> (mpsc::Sender<ProgressEvent>, mpsc::Receiver<ProgressEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Producer side, shared by every task in a run.
pub struct ProgressReporter {
    sender: Option<mpsc::Sender<ProgressEvent>>,
    total: usize,
    completed: Mutex<usize>,
    dropped: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(sender: Option<mpsc::Sender<ProgressEvent>>, total: usize) -> Self {
        Self {
            sender,
            total,
            completed: Mutex::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Report that `task` is entering or leaving `step`.
    pub fn step(&self, task: &str, step: &str) {
        self.emit(task, step, false);
    }

    /// Count one task as terminal and report it.
    pub fn task_finished(&self, task: &str, outcome: &str) {
        self.emit(task, outcome, true);
    }

    pub fn completed(&self) -> usize {
        match self.completed.lock() {
            Ok(completed) => *completed,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Events discarded because the channel was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn emit(&self, task: &str, step: &str, finished: bool) {
        // Sending under the lock keeps `completed_tasks` ordered in the channel.
        let mut completed = match self.completed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if finished {
            *completed = (*completed + 1).min(self.total);
        }
        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent {
            total_tasks: self.total,
            completed_tasks: *completed,
            current_task: task.to_string(),
            current_step: step.to_string(),
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
