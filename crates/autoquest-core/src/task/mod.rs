pub mod deadline;
pub mod scripted;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

pub use deadline::WithDeadline;
pub use scripted::{Action, ActionDriver, RecordingDriver, ScriptedTask};

use crate::models::{CoreError, CoreErrorKind, ResourceKey, StepOutcome};

/// A resumable unit of work advanced one step at a time.
///
/// Everything a task does between two `step` calls is atomic from the
/// scheduler's point of view, so steps should stay short enough for other
/// tasks to interleave.
pub trait Task: Send {
    /// The interaction surface every step of this task needs exclusively.
    fn resource_key(&self) -> Option<&ResourceKey> {
        None
    }

    /// Earliest instant a step can make progress. The scheduler does not
    /// step the task before then, and the skipped poll is not a step.
    fn ready_at(&self) -> Option<Instant> {
        None
    }

    fn step(&mut self) -> StepOutcome;
}

impl Task for Box<dyn Task> {
    fn resource_key(&self) -> Option<&ResourceKey> {
        (**self).resource_key()
    }

    fn ready_at(&self) -> Option<Instant> {
        (**self).ready_at()
    }

    fn step(&mut self) -> StepOutcome {
        (**self).step()
    }
}

pub struct FnTask<F> {
    resource: Option<ResourceKey>,
    step: F,
}

/// Adapts a closure into a [`Task`].
pub fn from_fn<F>(resource: Option<ResourceKey>, step: F) -> FnTask<F>
where
    F: FnMut() -> StepOutcome + Send,
{
    FnTask { resource, step }
}

impl<F> Task for FnTask<F>
where
    F: FnMut() -> StepOutcome + Send,
{
    fn resource_key(&self) -> Option<&ResourceKey> {
        self.resource.as_ref()
    }

    fn step(&mut self) -> StepOutcome {
        (self.step)()
    }
}

/// Owns one task instance and enforces its lifecycle: once a step reports a
/// terminal outcome the instance is dropped and further steps fail with
/// `InvalidState`. A panicking step becomes `InternalFault` for this task only.
pub struct TaskCell {
    task: Option<Box<dyn Task>>,
    resource: Option<ResourceKey>,
}

impl TaskCell {
    pub fn new(task: Box<dyn Task>) -> Self {
        let resource = task.resource_key().cloned();
        Self {
            task: Some(task),
            resource,
        }
    }

    pub fn resource_key(&self) -> Option<&ResourceKey> {
        self.resource.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_none()
    }

    /// Returns the instant the task waits for when it is not ready at `now`.
    pub fn waiting_until(&self, now: Instant) -> Option<Instant> {
        self.task
            .as_ref()
            .and_then(|task| task.ready_at())
            .filter(|ready_at| *ready_at > now)
    }

    pub fn step(&mut self) -> Result<StepOutcome, CoreError> {
        let Some(task) = self.task.as_mut() else {
            return Err(CoreError::new(
                CoreErrorKind::InvalidState,
                "task already reached a terminal state",
            ));
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| task.step())) {
            Ok(outcome) => outcome,
            Err(payload) => StepOutcome::error(
                CoreErrorKind::InternalFault,
                format!("task step panicked: {}", panic_message(payload.as_ref())),
            ),
        };

        if outcome.is_terminal() {
            self.task = None;
        }
        Ok(outcome)
    }

    /// Drops the instance without stepping it again.
    pub fn retire(&mut self) {
        self.task = None;
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
