use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::models::{
    CoreErrorKind, RunId, StepOutcome, TaskId, TaskState, TerminalStatus, Tier,
};
use crate::orchestration::{
    CancellationToken, LockHolder, ResolvedTask, ResourceLockTable, RunBoard, RunObserver,
    RunReport, TaskReport, visit_sequence,
};
use crate::task::{TaskCell, panic_message};

/// What happened during one round.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoundOutcome {
    pub round: u64,
    /// Steps actually executed.
    pub stepped: usize,
    /// Tasks passed over because their resource was held elsewhere.
    pub skipped: usize,
    /// Tasks left alone because they reported they are not ready yet.
    pub waiting: usize,
    /// Earliest instant one of the waiting tasks becomes ready.
    pub next_ready: Option<Instant>,
    /// Tasks that reached a terminal state this round.
    pub finished: usize,
    /// Cancellation was observed before the round visited every task.
    pub interrupted: bool,
}

struct Slot {
    task_id: TaskId,
    tag: String,
    task_name: String,
    tier: Tier,
    cell: Option<TaskCell>,
}

impl Slot {
    fn is_done(&self) -> bool {
        self.cell.as_ref().is_none_or(TaskCell::is_finished)
    }

    fn retire(&mut self) {
        if let Some(cell) = self.cell.as_mut() {
            cell.retire();
        }
    }
}

pub struct SchedulerBuilder {
    run_id: RunId,
    name: String,
    locks: ResourceLockTable,
    config: SchedulerConfig,
    cancel: CancellationToken,
    observer: Option<Arc<dyn RunObserver>>,
}

impl SchedulerBuilder {
    /// Shares the resource keyspace with other runs.
    pub fn locks(mut self, locks: ResourceLockTable) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Instantiates every task through its factory. A factory that panics
    /// yields a task that is already finished with `InternalFault`.
    pub fn build(self, resolved: Vec<ResolvedTask>) -> Scheduler {
        let reports = resolved
            .iter()
            .enumerate()
            .map(|(index, task)| TaskReport {
                task_id: TaskId(index as u64),
                tag: task.definition.tag().to_string(),
                task_name: task.definition.task_name().to_string(),
                tier: task.tier,
                order: task.order,
                state: TaskState::Created,
                steps: 0,
                finished_round: None,
            })
            .collect();

        let mut board = RunBoard::new(self.run_id, self.name.clone(), reports);
        if let Some(observer) = self.observer {
            board = board.with_observer(observer);
        }

        let mut slots = Vec::with_capacity(resolved.len());
        for index in visit_sequence(&resolved) {
            let task = &resolved[index];
            let task_id = TaskId(index as u64);
            let cell = match catch_unwind(AssertUnwindSafe(|| task.definition.instantiate())) {
                Ok(instance) => Some(TaskCell::new(instance)),
                Err(payload) => {
                    let message = format!("task factory panicked: {}", panic_message(payload.as_ref()));
                    tracing::warn!(
                        run_id = self.run_id.0,
                        task_id = task_id.0,
                        tag = %task.definition.tag(),
                        task_name = %task.definition.task_name(),
                        message = %message,
                        "task could not be instantiated"
                    );
                    board.finish(
                        task_id,
                        TerminalStatus::Error {
                            kind: CoreErrorKind::InternalFault,
                            message,
                        },
                        0,
                    );
                    None
                }
            };

            slots.push(Slot {
                task_id,
                tag: task.definition.tag().to_string(),
                task_name: task.definition.task_name().to_string(),
                tier: task.tier,
                cell,
            });
        }

        Scheduler {
            run_id: self.run_id,
            name: self.name,
            slots,
            locks: self.locks,
            board,
            cancel: self.cancel,
            config: self.config,
            round: 0,
        }
    }
}

/// Drives one run: cooperative round-robin stepping in tier order with
/// per-resource exclusivity. Exactly one step executes at a time inside a
/// run; separate runs may interleave and only contend through the lock table.
pub struct Scheduler {
    run_id: RunId,
    name: String,
    slots: Vec<Slot>,
    locks: ResourceLockTable,
    board: RunBoard,
    cancel: CancellationToken,
    config: SchedulerConfig,
    round: u64,
}

impl Scheduler {
    pub fn builder(run_id: RunId, name: impl Into<String>) -> SchedulerBuilder {
        SchedulerBuilder {
            run_id,
            name: name.into(),
            locks: ResourceLockTable::new(),
            config: SchedulerConfig::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn board(&self) -> &RunBoard {
        &self.board
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn rounds(&self) -> u64 {
        self.round
    }

    pub fn is_finished(&self) -> bool {
        self.slots.iter().all(Slot::is_done)
    }

    pub fn snapshot(&self) -> RunReport {
        self.board.snapshot()
    }

    /// Cancels every pending task. No step starts once the scheduler has
    /// observed the cancellation.
    pub fn cancel_all(&mut self) {
        self.cancel.cancel();
        self.stop_cancelled();
    }

    /// Attempts one step on every non-terminal task in visiting order.
    pub fn run_round(&mut self) -> RoundOutcome {
        if self.is_finished() {
            return RoundOutcome {
                round: self.round,
                ..RoundOutcome::default()
            };
        }

        self.round += 1;
        let round = self.round;
        let mut outcome = RoundOutcome {
            round,
            ..RoundOutcome::default()
        };

        for slot in &mut self.slots {
            if slot.is_done() {
                continue;
            }
            if self.cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if self.board.is_terminal(slot.task_id) {
                slot.retire();
                continue;
            }
            let Some(cell) = slot.cell.as_mut() else {
                continue;
            };
            if let Some(ready_at) = cell.waiting_until(Instant::now()) {
                outcome.waiting += 1;
                outcome.next_ready = Some(
                    outcome
                        .next_ready
                        .map_or(ready_at, |earliest| earliest.min(ready_at)),
                );
                continue;
            }

            let holder = LockHolder {
                run: self.run_id,
                task: slot.task_id,
            };
            let guard = match cell.resource_key() {
                Some(key) => match self.locks.try_guard(key, holder) {
                    Some(guard) => Some(guard),
                    None => {
                        tracing::trace!(
                            run_id = self.run_id.0,
                            task_id = slot.task_id.0,
                            resource = %key,
                            round,
                            "resource busy, task skipped this round"
                        );
                        outcome.skipped += 1;
                        continue;
                    }
                },
                None => None,
            };

            if self.cancel.is_cancelled() {
                drop(guard);
                outcome.interrupted = true;
                break;
            }

            let step = cell.step();
            drop(guard);
            outcome.stepped += 1;

            if !self.board.record_step(slot.task_id, round) {
                tracing::debug!(
                    run_id = self.run_id.0,
                    task_id = slot.task_id.0,
                    round,
                    "discarding step result of a task finished elsewhere"
                );
                slot.retire();
                continue;
            }

            let terminal = match step {
                Ok(StepOutcome::Suspended) => {
                    tracing::debug!(
                        run_id = self.run_id.0,
                        task_id = slot.task_id.0,
                        tag = %slot.tag,
                        task_name = %slot.task_name,
                        tier = %slot.tier,
                        round,
                        "task suspended"
                    );
                    None
                }
                Ok(StepOutcome::Done) => {
                    tracing::debug!(
                        run_id = self.run_id.0,
                        task_id = slot.task_id.0,
                        tag = %slot.tag,
                        task_name = %slot.task_name,
                        round,
                        "task finished"
                    );
                    Some(TerminalStatus::Ok)
                }
                Ok(StepOutcome::DoneWithError(kind, message)) => {
                    Some(TerminalStatus::Error { kind, message })
                }
                Err(error) => Some(TerminalStatus::Error {
                    kind: error.kind,
                    message: error.message,
                }),
            };

            if let Some(status) = terminal {
                if let TerminalStatus::Error { kind, message } = &status {
                    tracing::warn!(
                        run_id = self.run_id.0,
                        task_id = slot.task_id.0,
                        tag = %slot.tag,
                        task_name = %slot.task_name,
                        round,
                        kind = ?kind,
                        message = %message,
                        "task failed"
                    );
                }
                slot.retire();
                if self.board.finish(slot.task_id, status, round) {
                    outcome.finished += 1;
                }
            }
        }

        if outcome.interrupted {
            self.stop_cancelled();
        }
        outcome
    }

    /// Runs rounds until every task is terminal or the run is cancelled.
    pub fn run_to_completion(&mut self) -> RunReport {
        tracing::info!(
            run_id = self.run_id.0,
            name = %self.name,
            tasks = self.slots.len(),
            "run started"
        );

        loop {
            if self.cancel.is_cancelled() {
                self.stop_cancelled();
                break;
            }
            if self.is_finished() {
                break;
            }
            if let Some(max_rounds) = self.config.max_rounds
                && self.round >= max_rounds
            {
                tracing::warn!(
                    run_id = self.run_id.0,
                    max_rounds,
                    "round limit reached, cancelling remaining tasks"
                );
                self.cancel_all();
                break;
            }

            let outcome = self.run_round();
            if outcome.stepped == 0 && (outcome.skipped > 0 || outcome.waiting > 0) {
                std::thread::sleep(self.idle_pause(&outcome));
            } else if !self.config.round_pause.is_zero() {
                std::thread::sleep(self.config.round_pause);
            }
        }

        self.locks.release_run(self.run_id);
        self.board.mark_complete(self.round);

        let report = self.board.snapshot();
        tracing::info!(
            run_id = self.run_id.0,
            name = %self.name,
            rounds = report.rounds,
            failed = report.errors().count(),
            succeeded = report.succeeded(),
            "run finished"
        );
        report
    }

    // Capped at `idle_backoff`.
    fn idle_pause(&self, outcome: &RoundOutcome) -> Duration {
        match outcome.next_ready {
            Some(ready_at) if outcome.skipped == 0 => self
                .config
                .idle_backoff
                .min(ready_at.saturating_duration_since(Instant::now())),
            _ => self.config.idle_backoff,
        }
    }

    fn stop_cancelled(&mut self) {
        let cancelled = self.board.cancel_pending();
        for slot in &mut self.slots {
            slot.retire();
        }
        if cancelled > 0 {
            tracing::info!(
                run_id = self.run_id.0,
                name = %self.name,
                cancelled,
                round = self.round,
                "run cancelled"
            );
        }
    }
}
