use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::models::{RunId, TaskId, TaskState, TerminalStatus, Tier};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub tag: String,
    pub task_name: String,
    pub tier: Tier,
    pub order: usize,
    pub state: TaskState,
    pub steps: u64,
    pub finished_round: Option<u64>,
}

impl TaskReport {
    pub fn terminal_status(&self) -> Option<&TerminalStatus> {
        self.state.terminal_status()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub name: String,
    pub tasks: Vec<TaskReport>,
    pub rounds: u64,
    pub complete: bool,
}

impl RunReport {
    /// Complete and no task reported an error. Cancelled tasks are not errors.
    pub fn succeeded(&self) -> bool {
        self.complete && self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|task| {
            task.terminal_status()
                .is_some_and(TerminalStatus::is_error)
        })
    }

    pub fn task(&self, task_id: TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    pub fn task_named(&self, tag: &str, task_name: &str) -> Option<&TaskReport> {
        self.tasks
            .iter()
            .find(|task| task.tag == tag && task.task_name == task_name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub runs: Vec<RunReport>,
}

impl BatchReport {
    /// Completion is independent of individual task errors.
    pub fn is_complete(&self) -> bool {
        self.runs.iter().all(|run| run.complete)
    }

    pub fn succeeded(&self) -> bool {
        self.runs.iter().all(RunReport::succeeded)
    }
}

/// Notified whenever a task of a run reaches a terminal state.
pub trait RunObserver: Send + Sync {
    fn task_finished(&self, run_id: RunId, run_name: &str, task: &TaskReport);
}

/// Live status of one run, shared between its scheduler and its handles.
/// Terminal transitions are visible here as soon as they happen.
#[derive(Clone)]
pub struct RunBoard {
    report: Arc<Mutex<RunReport>>,
    changed: Arc<Notify>,
    observer: Option<Arc<dyn RunObserver>>,
}

impl RunBoard {
    pub fn new(run_id: RunId, name: impl Into<String>, tasks: Vec<TaskReport>) -> Self {
        Self {
            report: Arc::new(Mutex::new(RunReport {
                run_id,
                name: name.into(),
                tasks,
                rounds: 0,
                complete: false,
            })),
            changed: Arc::new(Notify::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn snapshot(&self) -> RunReport {
        self.lock_report().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.lock_report().complete
    }

    pub fn is_terminal(&self, task_id: TaskId) -> bool {
        self.lock_report()
            .tasks
            .get(index(task_id))
            .is_none_or(TaskReport::is_terminal)
    }

    pub async fn wait_complete(&self) -> RunReport {
        loop {
            let mut notified = std::pin::pin!(self.changed.notified());
            notified.as_mut().enable();

            let snapshot = self.snapshot();
            if snapshot.complete {
                return snapshot;
            }
            notified.await;
        }
    }

    /// Counts one executed step. Returns false when the task is already
    /// terminal, e.g. cancelled while its step was running.
    pub(crate) fn record_step(&self, task_id: TaskId, round: u64) -> bool {
        let mut guard = self.lock_report();
        let report = &mut *guard;
        report.rounds = report.rounds.max(round);
        let Some(task) = report.tasks.get_mut(index(task_id)) else {
            return false;
        };
        if task.is_terminal() {
            return false;
        }
        task.steps += 1;
        task.state = TaskState::Running;
        true
    }

    /// Moves a task to a terminal state unless it already is terminal.
    pub(crate) fn finish(&self, task_id: TaskId, status: TerminalStatus, round: u64) -> bool {
        let finished = {
            let mut guard = self.lock_report();
            let report = &mut *guard;
            let Some(task) = report.tasks.get_mut(index(task_id)) else {
                return false;
            };
            if task.is_terminal() {
                return false;
            }
            task.state = TaskState::Finished(status);
            task.finished_round = Some(round);
            (report.run_id, report.name.clone(), task.clone())
        };

        self.notify_finished(std::slice::from_ref(&finished.2), finished.0, &finished.1);
        true
    }

    /// Marks every non-terminal task cancelled. Returns how many changed.
    pub fn cancel_pending(&self) -> usize {
        let (run_id, name, cancelled) = {
            let mut guard = self.lock_report();
            let report = &mut *guard;
            let round = report.rounds;
            let mut cancelled = Vec::new();
            for task in report.tasks.iter_mut().filter(|task| !task.is_terminal()) {
                task.state = TaskState::Finished(TerminalStatus::Cancelled);
                task.finished_round = Some(round);
                cancelled.push(task.clone());
            }
            (report.run_id, report.name.clone(), cancelled)
        };

        self.notify_finished(&cancelled, run_id, &name);
        cancelled.len()
    }

    pub(crate) fn mark_complete(&self, rounds: u64) {
        {
            let mut guard = self.lock_report();
            let report = &mut *guard;
            report.rounds = report.rounds.max(rounds);
            report.complete = true;
        }
        self.changed.notify_waiters();
    }

    fn notify_finished(&self, tasks: &[TaskReport], run_id: RunId, run_name: &str) {
        if tasks.is_empty() {
            return;
        }
        if let Some(observer) = &self.observer {
            for task in tasks {
                observer.task_finished(run_id, run_name, task);
            }
        }
        self.changed.notify_waiters();
    }

    // Every update is a single field assignment under the lock.
    fn lock_report(&self) -> MutexGuard<'_, RunReport> {
        self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn index(task_id: TaskId) -> usize {
    usize::try_from(task_id.0).unwrap_or(usize::MAX)
}
