//! Per-case export task states and failures.

use casedesk_api::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::format::FormatError;

/// Where a task is in its pipeline.
///
/// `Pending → Fetching → Formatting → Writing → Done`, or straight to
/// `Failed` from whichever step went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Pending,
    Fetching,
    Formatting,
    Writing,
    Done,
    Failed,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Pending => "pending",
            TaskStage::Fetching => "fetching",
            TaskStage::Formatting => "formatting",
            TaskStage::Writing => "writing",
            TaskStage::Done => "done",
            TaskStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Done | TaskStage::Failed)
    }

    /// Counted against the parallelism limit.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStage::Fetching | TaskStage::Formatting | TaskStage::Writing
        )
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one case failed to export. Never fails the run on its own.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("fetch failed: {0}")]
    Fetch(#[source] ApiError),

    #[error("format failed: {0}")]
    Format(#[source] FormatError),

    #[error("write failed: {0}")]
    Write(String),

    #[error("cancelled while {0}")]
    Cancelled(TaskStage),

    /// The task died without reporting (panic or abort).
    #[error("task crashed: {0}")]
    Crashed(String),
}

impl TaskError {
    /// The step the task was in when it stopped.
    pub fn stage(&self) -> TaskStage {
        match self {
            TaskError::Fetch(_) => TaskStage::Fetching,
            TaskError::Format(_) => TaskStage::Formatting,
            TaskError::Write(_) => TaskStage::Writing,
            TaskError::Cancelled(stage) => *stage,
            TaskError::Crashed(_) => TaskStage::Failed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled(_))
    }
}
