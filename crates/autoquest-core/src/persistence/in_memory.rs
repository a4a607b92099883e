use std::sync::{Mutex, MutexGuard};

use crate::models::{CoreError, CoreErrorKind, TaskPlan};
use crate::persistence::{PersistenceResult, PlanStore, validate_plan};

#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<Vec<TaskPlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = TaskPlan>) -> PersistenceResult<Self> {
        let store = Self::new();
        for plan in plans {
            store.upsert_plan(&plan)?;
        }
        Ok(store)
    }

    fn lock_plans(&self) -> PersistenceResult<MutexGuard<'_, Vec<TaskPlan>>> {
        self.plans.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::InternalFault, "plan store mutex poisoned")
        })
    }
}

impl PlanStore for InMemoryPlanStore {
    fn list_plans(&self) -> PersistenceResult<Vec<TaskPlan>> {
        Ok(self.lock_plans()?.clone())
    }

    fn plan(&self, id: &str) -> PersistenceResult<Option<TaskPlan>> {
        Ok(self.lock_plans()?.iter().find(|plan| plan.id == id).cloned())
    }

    fn upsert_plan(&self, plan: &TaskPlan) -> PersistenceResult<()> {
        validate_plan(plan)?;
        let mut plans = self.lock_plans()?;
        match plans.iter_mut().find(|existing| existing.id == plan.id) {
            Some(existing) => *existing = plan.clone(),
            None => plans.push(plan.clone()),
        }
        Ok(())
    }

    fn remove_plan(&self, id: &str) -> PersistenceResult<bool> {
        let mut plans = self.lock_plans()?;
        let before = plans.len();
        plans.retain(|plan| plan.id != id);
        Ok(plans.len() != before)
    }
}
