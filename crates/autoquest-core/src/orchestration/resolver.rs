use crate::models::{TaskPlan, Tier};
use crate::orchestration::{OrchestrationResult, classify};
use crate::registry::{TaskDefinition, TaskRegistry};

/// A task definition selected for a run, annotated with its tier and its
/// position in plan order.
#[derive(Clone, Debug)]
pub struct ResolvedTask {
    pub tier: Tier,
    pub order: usize,
    pub definition: TaskDefinition,
}

impl PartialEq for ResolvedTask {
    fn eq(&self, other: &Self) -> bool {
        self.tier == other.tier
            && self.order == other.order
            && self.definition.tag() == other.definition.tag()
            && self.definition.task_name() == other.definition.task_name()
    }
}

impl Eq for ResolvedTask {}

/// Resolves the checked items of a plan against the registry.
///
/// Groups and items keep their plan order. Every reference is looked up
/// before anything is returned, so an unknown tag or task name fails the
/// whole plan and no task is ever instantiated.
pub fn resolve(plan: &TaskPlan, registry: &TaskRegistry) -> OrchestrationResult<Vec<ResolvedTask>> {
    let mut resolved = Vec::new();

    for group in &plan.groups {
        let tier = classify(registry, &group.tag)?;
        for item in group.items.iter().filter(|item| item.checked) {
            let definition = registry.lookup(&group.tag, &item.task_name)?;
            resolved.push(ResolvedTask {
                tier,
                order: resolved.len(),
                definition: definition.clone(),
            });
        }
    }

    Ok(resolved)
}

/// Resolves every task registered under one tag, in registration order.
pub fn resolve_tag(tag: &str, registry: &TaskRegistry) -> OrchestrationResult<Vec<ResolvedTask>> {
    let tier = classify(registry, tag)?;
    Ok(registry
        .definitions(tag)?
        .iter()
        .enumerate()
        .map(|(order, definition)| ResolvedTask {
            tier,
            order,
            definition: definition.clone(),
        })
        .collect())
}
