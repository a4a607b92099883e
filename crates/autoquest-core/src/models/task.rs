use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::{CoreErrorKind, Tier};

/// Position of a task inside one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

/// Result of advancing a task by one step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Suspended,
    Done,
    DoneWithError(CoreErrorKind, String),
}

impl StepOutcome {
    pub fn error(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        StepOutcome::DoneWithError(kind, message.into())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepOutcome::Suspended)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    Ok,
    Error { kind: CoreErrorKind, message: String },
    Cancelled,
}

impl TerminalStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, TerminalStatus::Error { .. })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Running,
    Finished(TerminalStatus),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished(_))
    }

    pub fn terminal_status(&self) -> Option<&TerminalStatus> {
        match self {
            TaskState::Finished(status) => Some(status),
            _ => None,
        }
    }
}

/// Persisted terminal record of one task of one run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub run_name: String,
    pub tag: String,
    pub task_name: String,
    pub tier: Tier,
    pub status: TerminalStatus,
    pub steps: u64,
    pub finished_at: SystemTime,
}
