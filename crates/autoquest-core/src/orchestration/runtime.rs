use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::time::timeout;

use crate::config::SchedulerConfig;
use crate::models::{CoreError, CoreErrorKind, RunId, TaskRecord};
use crate::orchestration::{
    BatchReport, CancellationToken, OrchestrationResult, ResolvedTask, ResourceLockTable,
    RunBoard, RunObserver, RunReport, Scheduler, TaskReport, resolve, resolve_tag,
};
use crate::persistence::{PlanStore, RunStore};
use crate::registry::TaskRegistry;
use crate::task::panic_message;

/// Entry point for callers: resolves tags and plans, starts each run on the
/// blocking pool and hands back a handle to observe or cancel it. Every run
/// started from one runtime shares the same resource keyspace.
#[derive(Clone)]
pub struct AutomationRuntime {
    registry: Arc<TaskRegistry>,
    plans: Arc<dyn PlanStore>,
    locks: ResourceLockTable,
    run_store: Option<Arc<dyn RunStore>>,
    config: SchedulerConfig,
    next_run_id: Arc<AtomicU64>,
}

impl AutomationRuntime {
    pub fn new(registry: Arc<TaskRegistry>, plans: Arc<dyn PlanStore>) -> Self {
        Self {
            registry,
            plans,
            locks: ResourceLockTable::new(),
            run_store: None,
            config: SchedulerConfig::default(),
            next_run_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Persists every terminal task record. Run ids continue after the
    /// highest id already in the store.
    pub fn with_run_store(mut self, run_store: Arc<dyn RunStore>) -> OrchestrationResult<Self> {
        let next = run_store.next_run_id()?;
        self.next_run_id = Arc::new(AtomicU64::new(next));
        self.run_store = Some(run_store);
        Ok(self)
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn plans(&self) -> &dyn PlanStore {
        self.plans.as_ref()
    }

    pub fn locks(&self) -> &ResourceLockTable {
        &self.locks
    }

    /// Runs every task registered under `tag`.
    pub fn run_tag(&self, tag: &str) -> OrchestrationResult<RunHandle> {
        let resolved = resolve_tag(tag, &self.registry)?;
        self.run_resolved(tag, resolved)
    }

    /// Loads, resolves and runs a persisted plan.
    pub fn run_plan(&self, plan_id: &str) -> OrchestrationResult<RunHandle> {
        let plan = self.plans.plan(plan_id)?.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("no task plan with id '{plan_id}'"),
            )
        })?;
        let resolved = resolve(&plan, &self.registry)?;
        self.run_resolved(&plan.plan_name, resolved)
    }

    /// Starts one run per tag. Every tag is resolved before any run starts.
    pub fn run_many<I, S>(&self, tags: I) -> OrchestrationResult<BatchHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolved = tags
            .into_iter()
            .map(|tag| {
                let tag = tag.as_ref();
                resolve_tag(tag, &self.registry).map(|tasks| (tag.to_string(), tasks))
            })
            .collect::<OrchestrationResult<Vec<_>>>()?;
        runtime_handle()?;

        let runs = resolved
            .into_iter()
            .map(|(name, tasks)| self.run_resolved(&name, tasks))
            .collect::<OrchestrationResult<Vec<_>>>()?;
        Ok(BatchHandle { runs })
    }

    /// Starts a run over an already resolved task list.
    pub fn run_resolved(
        &self,
        name: &str,
        resolved: Vec<ResolvedTask>,
    ) -> OrchestrationResult<RunHandle> {
        let runtime = runtime_handle()?;
        let run_id = RunId(self.next_run_id.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();

        let mut builder = Scheduler::builder(run_id, name)
            .locks(self.locks.clone())
            .config(self.config)
            .cancellation(cancel.clone());
        if let Some(run_store) = &self.run_store {
            builder = builder.observer(Arc::new(StoreObserver {
                run_store: run_store.clone(),
            }));
        }
        let mut scheduler = builder.build(resolved);
        let board = scheduler.board().clone();

        let locks = self.locks.clone();
        let run_board = board.clone();
        runtime.spawn_blocking(move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| scheduler.run_to_completion())) {
                tracing::error!(
                    run_id = run_id.0,
                    message = %panic_message(payload.as_ref()),
                    "scheduler loop panicked"
                );
                run_board.cancel_pending();
                locks.release_run(run_id);
                run_board.mark_complete(0);
            }
        });

        Ok(RunHandle {
            run_id,
            name: name.to_string(),
            board,
            cancel,
        })
    }
}

/// Observes and controls one run.
#[derive(Clone)]
pub struct RunHandle {
    run_id: RunId,
    name: String,
    board: RunBoard,
    cancel: CancellationToken,
}

impl Debug for RunHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("name", &self.name)
            .field("complete", &self.board.is_complete())
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> RunReport {
        self.board.snapshot()
    }

    pub fn is_complete(&self) -> bool {
        self.board.is_complete()
    }

    /// Marks every pending task cancelled. A step the scheduler already
    /// started is allowed to return and its result is discarded.
    pub fn cancel_all(&self) -> usize {
        if self.board.is_complete() {
            return 0;
        }
        self.cancel.cancel();
        let cancelled = self.board.cancel_pending();
        tracing::info!(run_id = self.run_id.0, name = %self.name, cancelled, "cancel requested");
        cancelled
    }

    pub async fn wait(&self) -> RunReport {
        self.board.wait_complete().await
    }

    pub async fn wait_timeout(&self, duration: Duration) -> OrchestrationResult<RunReport> {
        timeout(duration, self.wait()).await.map_err(|_| {
            CoreError::new(
                CoreErrorKind::Timeout,
                format!("timed out waiting for run '{}' to complete", self.run_id.0),
            )
        })
    }
}

/// Several runs started together; complete when every run is.
#[derive(Clone, Debug)]
pub struct BatchHandle {
    runs: Vec<RunHandle>,
}

impl BatchHandle {
    pub fn runs(&self) -> &[RunHandle] {
        &self.runs
    }

    pub fn snapshot(&self) -> BatchReport {
        BatchReport {
            runs: self.runs.iter().map(RunHandle::snapshot).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.runs.iter().all(RunHandle::is_complete)
    }

    pub fn cancel_all(&self) -> usize {
        self.runs.iter().map(RunHandle::cancel_all).sum()
    }

    pub async fn wait(&self) -> BatchReport {
        let mut runs = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            runs.push(run.wait().await);
        }
        BatchReport { runs }
    }

    pub async fn wait_timeout(&self, duration: Duration) -> OrchestrationResult<BatchReport> {
        timeout(duration, self.wait()).await.map_err(|_| {
            CoreError::new(
                CoreErrorKind::Timeout,
                "timed out waiting for batch to complete",
            )
        })
    }
}

struct StoreObserver {
    run_store: Arc<dyn RunStore>,
}

impl RunObserver for StoreObserver {
    fn task_finished(&self, run_id: RunId, run_name: &str, task: &TaskReport) {
        let Some(status) = task.terminal_status() else {
            return;
        };
        let record = TaskRecord {
            run_id,
            task_id: task.task_id,
            run_name: run_name.to_string(),
            tag: task.tag.clone(),
            task_name: task.task_name.clone(),
            tier: task.tier,
            status: status.clone(),
            steps: task.steps,
            finished_at: SystemTime::now(),
        };

        if let Err(error) = self.run_store.record_task(&record) {
            tracing::error!(
                run_id = run_id.0,
                task_id = task.task_id.0,
                tag = %task.tag,
                task_name = %task.task_name,
                kind = ?error.kind,
                message = %error.message,
                "failed to persist task record"
            );
        }
    }
}

fn runtime_handle() -> OrchestrationResult<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|error| {
        CoreError::new(
            CoreErrorKind::InternalFault,
            format!("runs must be started inside a tokio runtime: {error}"),
        )
    })
}
