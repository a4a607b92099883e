use std::time::{Duration, Instant};

use crate::models::{CoreErrorKind, ResourceKey, StepOutcome};
use crate::task::Task;

/// Wraps a task with a time budget measured from its first step. Once the
/// budget is spent the task ends with `Timeout` instead of stepping again.
pub struct WithDeadline<T> {
    inner: T,
    budget: Duration,
    started_at: Option<Instant>,
}

impl<T: Task> WithDeadline<T> {
    pub fn new(inner: T, budget: Duration) -> Self {
        Self {
            inner,
            budget,
            started_at: None,
        }
    }
}

impl<T: Task> Task for WithDeadline<T> {
    fn resource_key(&self) -> Option<&ResourceKey> {
        self.inner.resource_key()
    }

    // Wakes up for the deadline even while the inner task still waits.
    fn ready_at(&self) -> Option<Instant> {
        let ready_at = self.inner.ready_at()?;
        Some(match self.started_at {
            Some(started_at) => ready_at.min(started_at + self.budget),
            None => ready_at,
        })
    }

    fn step(&mut self) -> StepOutcome {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let elapsed = started_at.elapsed();
        if elapsed > self.budget {
            return StepOutcome::error(
                CoreErrorKind::Timeout,
                format!(
                    "deadline of {}ms exceeded after {}ms",
                    self.budget.as_millis(),
                    elapsed.as_millis()
                ),
            );
        }
        self.inner.step()
    }
}
