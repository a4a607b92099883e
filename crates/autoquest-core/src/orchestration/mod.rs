pub mod report;
pub mod resolver;
pub mod resource_lock;
pub mod runtime;
pub mod scheduler;
pub mod tier_order;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use report::{BatchReport, RunBoard, RunObserver, RunReport, TaskReport};
pub use resolver::{ResolvedTask, resolve, resolve_tag};
pub use resource_lock::{LockHolder, ResourceGuard, ResourceLockTable};
pub use runtime::{AutomationRuntime, BatchHandle, RunHandle};
pub use scheduler::{RoundOutcome, Scheduler, SchedulerBuilder};
pub use tier_order::{classify, tier_phases, visit_sequence};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
