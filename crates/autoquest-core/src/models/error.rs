use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreErrorKind {
    UnknownTag,
    UnknownTask,
    DuplicateDefinition,
    InvalidInput,
    Timeout,
    InternalFault,
    ActionFailure,
    InvalidState,
    Cancelled,
    StorageFailure,
    ParseFailure,
}

impl CoreErrorKind {
    pub const ALL: [CoreErrorKind; 11] = [
        CoreErrorKind::UnknownTag,
        CoreErrorKind::UnknownTask,
        CoreErrorKind::DuplicateDefinition,
        CoreErrorKind::InvalidInput,
        CoreErrorKind::Timeout,
        CoreErrorKind::InternalFault,
        CoreErrorKind::ActionFailure,
        CoreErrorKind::InvalidState,
        CoreErrorKind::Cancelled,
        CoreErrorKind::StorageFailure,
        CoreErrorKind::ParseFailure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoreErrorKind::UnknownTag => "unknown_tag",
            CoreErrorKind::UnknownTask => "unknown_task",
            CoreErrorKind::DuplicateDefinition => "duplicate_definition",
            CoreErrorKind::InvalidInput => "invalid_input",
            CoreErrorKind::Timeout => "timeout",
            CoreErrorKind::InternalFault => "internal_fault",
            CoreErrorKind::ActionFailure => "action_failure",
            CoreErrorKind::InvalidState => "invalid_state",
            CoreErrorKind::Cancelled => "cancelled",
            CoreErrorKind::StorageFailure => "storage_failure",
            CoreErrorKind::ParseFailure => "parse_failure",
        }
    }

    /// Errors raised while building a registry or resolving a plan. They
    /// always prevent a run from starting.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            CoreErrorKind::UnknownTag
                | CoreErrorKind::UnknownTask
                | CoreErrorKind::DuplicateDefinition
        )
    }

    /// Errors that end exactly one task and never its siblings.
    pub fn is_runtime(self) -> bool {
        matches!(
            self,
            CoreErrorKind::Timeout | CoreErrorKind::InternalFault | CoreErrorKind::ActionFailure
        )
    }
}

impl FromStr for CoreErrorKind {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        CoreErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub tag: Option<String>,
    pub task_name: Option<String>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            tag: None,
            task_name: None,
            message: message.into(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_task(mut self, tag: impl Into<String>, task_name: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self.task_name = Some(task_name.into());
        self
    }
}
