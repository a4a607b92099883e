use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, Tier};
use crate::orchestration::OrchestrationResult;
use crate::task::Task;

pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// A named task available under a tag. Identity is `(tag, task_name)`.
#[derive(Clone)]
pub struct TaskDefinition {
    tag: String,
    task_name: String,
    factory: TaskFactory,
}

impl TaskDefinition {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn instantiate(&self) -> Box<dyn Task> {
        (self.factory)()
    }
}

impl Debug for TaskDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("tag", &self.tag)
            .field("task_name", &self.task_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct TagEntry {
    tag: String,
    tier: Tier,
    definitions: Vec<TaskDefinition>,
    by_name: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct TaskRegistryBuilder {
    tags: Vec<TagEntry>,
    by_tag: HashMap<String, usize>,
}

impl TaskRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a tag and its tier. Each tag is declared exactly once.
    pub fn declare_tag(
        &mut self,
        tag: impl Into<String>,
        tier: Tier,
    ) -> OrchestrationResult<&mut Self> {
        let tag = tag.into();
        if self.by_tag.contains_key(&tag) {
            return Err(CoreError::new(
                CoreErrorKind::DuplicateDefinition,
                format!("tag '{tag}' is already declared"),
            )
            .with_tag(tag));
        }

        self.by_tag.insert(tag.clone(), self.tags.len());
        self.tags.push(TagEntry {
            tag,
            tier,
            definitions: Vec::new(),
            by_name: HashMap::new(),
        });
        Ok(self)
    }

    pub fn register<F, T>(
        &mut self,
        tag: &str,
        task_name: impl Into<String>,
        factory: F,
    ) -> OrchestrationResult<&mut Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Task + 'static,
    {
        let task_name = task_name.into();
        let Some(&tag_index) = self.by_tag.get(tag) else {
            return Err(unknown_tag(tag));
        };
        let entry = &mut self.tags[tag_index];

        if entry.by_name.contains_key(&task_name) {
            return Err(CoreError::new(
                CoreErrorKind::DuplicateDefinition,
                format!("task '{task_name}' is already registered under tag '{tag}'"),
            )
            .with_task(tag, task_name));
        }

        entry.by_name.insert(task_name.clone(), entry.definitions.len());
        entry.definitions.push(TaskDefinition {
            tag: entry.tag.clone(),
            task_name,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Task>),
        });
        Ok(self)
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            tags: self.tags,
            by_tag: self.by_tag,
        }
    }
}

/// Process-lifetime catalog of task definitions grouped by tag. Immutable
/// once built; share it behind an `Arc`.
#[derive(Debug)]
pub struct TaskRegistry {
    tags: Vec<TagEntry>,
    by_tag: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::new()
    }

    pub fn lookup(&self, tag: &str, task_name: &str) -> OrchestrationResult<&TaskDefinition> {
        let entry = self.entry(tag)?;
        entry
            .by_name
            .get(task_name)
            .map(|&index| &entry.definitions[index])
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::UnknownTask,
                    format!("no task '{task_name}' is registered under tag '{tag}'"),
                )
                .with_task(tag, task_name)
            })
    }

    pub fn tier(&self, tag: &str) -> OrchestrationResult<Tier> {
        Ok(self.entry(tag)?.tier)
    }

    /// Definitions of one tag in registration order.
    pub fn definitions(&self, tag: &str) -> OrchestrationResult<&[TaskDefinition]> {
        Ok(&self.entry(tag)?.definitions)
    }

    /// Every declared tag with its tier, in declaration order.
    pub fn tags_with_tier(&self) -> Vec<(&str, Tier)> {
        self.tags
            .iter()
            .map(|entry| (entry.tag.as_str(), entry.tier))
            .collect()
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    fn entry(&self, tag: &str) -> OrchestrationResult<&TagEntry> {
        self.by_tag
            .get(tag)
            .map(|&index| &self.tags[index])
            .ok_or_else(|| unknown_tag(tag))
    }
}

fn unknown_tag(tag: &str) -> CoreError {
    CoreError::new(
        CoreErrorKind::UnknownTag,
        format!("tag '{tag}' was never declared"),
    )
    .with_tag(tag)
}
