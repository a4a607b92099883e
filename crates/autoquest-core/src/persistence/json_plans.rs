use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::{CoreError, CoreErrorKind, TaskPlan};
use crate::persistence::{PersistenceResult, PlanStore, validate_plan};

/// Task plans kept as one JSON array document, the format the desktop UI
/// edits. A missing file reads as an empty list.
pub struct JsonPlanStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> PersistenceResult<Vec<TaskPlan>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(self.io_error("read", &error)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("plan file '{}' is not valid: {error}", self.path.display()),
            )
        })
    }

    fn write_all(&self, plans: &[TaskPlan]) -> PersistenceResult<()> {
        let json = serde_json::to_string_pretty(plans).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!("failed to encode task plans: {error}"),
            )
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| self.io_error("create directory", &error))?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(|error| self.io_error("write", &error))?;
        fs::rename(&staging, &self.path).map_err(|error| self.io_error("replace", &error))
    }

    fn edit<T>(&self, change: impl FnOnce(&mut Vec<TaskPlan>) -> T) -> PersistenceResult<T> {
        let _guard = self.write_lock.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::InternalFault, "plan file lock poisoned")
        })?;
        let mut plans = self.read_all()?;
        let result = change(&mut plans);
        self.write_all(&plans)?;
        Ok(result)
    }

    fn io_error(&self, operation: &str, error: &std::io::Error) -> CoreError {
        CoreError::new(
            CoreErrorKind::StorageFailure,
            format!(
                "plan file '{}' {operation} failed: {error}",
                self.path.display()
            ),
        )
    }
}

impl PlanStore for JsonPlanStore {
    fn list_plans(&self) -> PersistenceResult<Vec<TaskPlan>> {
        self.read_all()
    }

    fn plan(&self, id: &str) -> PersistenceResult<Option<TaskPlan>> {
        Ok(self.read_all()?.into_iter().find(|plan| plan.id == id))
    }

    fn upsert_plan(&self, plan: &TaskPlan) -> PersistenceResult<()> {
        validate_plan(plan)?;
        self.edit(|plans| match plans.iter_mut().find(|existing| existing.id == plan.id) {
            Some(existing) => *existing = plan.clone(),
            None => plans.push(plan.clone()),
        })
    }

    fn remove_plan(&self, id: &str) -> PersistenceResult<bool> {
        self.edit(|plans| {
            let before = plans.len();
            plans.retain(|plan| plan.id != id);
            plans.len() != before
        })
    }
}
