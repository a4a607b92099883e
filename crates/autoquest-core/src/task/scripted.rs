use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, ResourceKey, StepOutcome};
use crate::task::Task;

/// A primitive interaction with one game window. Coordinates are relative
/// to the window's client area; translating them to screen space is the
/// driver's job.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Focus,
    MoveCursor { x: i32, y: i32 },
    Click { x: i32, y: i32 },
    KeyPress { key: String },
    /// Fails the task unless the pixel at `(x, y)` has the given color.
    ExpectPixel { x: i32, y: i32, rgb: [u8; 3] },
    /// Suspends the task without holding the window.
    Wait { millis: u64 },
    CloseWindow,
}

/// Performs window actions on behalf of tasks. Implementations live outside
/// the core (desktop automation, UI callbacks, recorders).
pub trait ActionDriver: Send + Sync {
    fn perform(&self, window_pid: u32, action: &Action) -> Result<(), CoreError>;
}

/// Runs an ordered list of actions against one window, one action per step.
pub struct ScriptedTask {
    window_pid: u32,
    resource: ResourceKey,
    actions: Vec<Action>,
    cursor: usize,
    waiting_until: Option<Instant>,
    driver: Arc<dyn ActionDriver>,
}

impl ScriptedTask {
    pub fn new(window_pid: u32, actions: Vec<Action>, driver: Arc<dyn ActionDriver>) -> Self {
        Self {
            window_pid,
            resource: ResourceKey::window(window_pid),
            actions,
            cursor: 0,
            waiting_until: None,
            driver,
        }
    }

    pub fn remaining(&self) -> usize {
        self.actions.len().saturating_sub(self.cursor)
    }
}

impl Task for ScriptedTask {
    fn resource_key(&self) -> Option<&ResourceKey> {
        Some(&self.resource)
    }

    fn ready_at(&self) -> Option<Instant> {
        self.waiting_until
    }

    fn step(&mut self) -> StepOutcome {
        if let Some(until) = self.waiting_until {
            if Instant::now() < until {
                return StepOutcome::Suspended;
            }
            self.waiting_until = None;
        }

        let Some(action) = self.actions.get(self.cursor) else {
            return StepOutcome::Done;
        };
        self.cursor += 1;

        if let Action::Wait { millis } = action {
            self.waiting_until = Some(Instant::now() + Duration::from_millis(*millis));
            return StepOutcome::Suspended;
        }

        if let Err(error) = self.driver.perform(self.window_pid, action) {
            return StepOutcome::error(
                CoreErrorKind::ActionFailure,
                format!("{action:?} on window {}: {}", self.window_pid, error.message),
            );
        }

        if self.cursor == self.actions.len() {
            StepOutcome::Done
        } else {
            StepOutcome::Suspended
        }
    }
}

/// Records every performed action instead of touching a real window.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    log: Arc<Mutex<Vec<(u32, Action)>>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(u32, Action)> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ActionDriver for RecordingDriver {
    fn perform(&self, window_pid: u32, action: &Action) -> Result<(), CoreError> {
        tracing::trace!(window_pid, action = ?action, "recorded action");
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((window_pid, action.clone()));
        Ok(())
    }
}
