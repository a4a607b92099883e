pub mod in_memory;
pub mod json_plans;

pub use in_memory::InMemoryPlanStore;
pub use json_plans::JsonPlanStore;

use crate::models::{CoreError, CoreErrorKind, TaskPlan, TaskRecord};

pub type PersistenceResult<T> = Result<T, CoreError>;

/// Persisted task plans. The scheduler only reads; editing is for the UI
/// and command layers.
pub trait PlanStore: Send + Sync {
    fn list_plans(&self) -> PersistenceResult<Vec<TaskPlan>>;

    fn plan(&self, id: &str) -> PersistenceResult<Option<TaskPlan>>;

    /// Inserts a new plan or replaces the plan with the same id.
    fn upsert_plan(&self, plan: &TaskPlan) -> PersistenceResult<()>;

    fn remove_plan(&self, id: &str) -> PersistenceResult<bool>;
}

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// History of finished tasks, one record per task per run.
pub trait RunStore: Send + Sync {
    fn record_task(&self, record: &TaskRecord) -> PersistenceResult<()>;

    fn list_recent_task_records(&self, limit: usize) -> PersistenceResult<Vec<TaskRecord>>;

    fn list_run(&self, run_id: u64) -> PersistenceResult<Vec<TaskRecord>>;

    fn next_run_id(&self) -> PersistenceResult<u64>;

    fn prune_records(&self, max_age_secs: i64) -> PersistenceResult<usize>;
}

pub(crate) fn validate_plan(plan: &TaskPlan) -> PersistenceResult<()> {
    if plan.id.trim().is_empty() {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            "task plan id must not be empty",
        ));
    }
    Ok(())
}
