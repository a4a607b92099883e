use crate::models::Tier;
use crate::orchestration::{OrchestrationResult, ResolvedTask};
use crate::registry::TaskRegistry;

/// Tier of a tag, as declared in the registry.
pub fn classify(registry: &TaskRegistry, tag: &str) -> OrchestrationResult<Tier> {
    registry.tier(tag)
}

/// The fixed visiting sequence of every round, as indices into `resolved`:
/// all time-limited tasks, then group tasks, then single tasks, each bucket
/// in plan order.
pub fn visit_sequence(resolved: &[ResolvedTask]) -> Vec<usize> {
    let mut buckets: [Vec<usize>; 3] = Default::default();
    for (index, task) in resolved.iter().enumerate() {
        buckets[task.tier.index()].push(index);
    }
    for bucket in &mut buckets {
        bucket.sort_by_key(|&index| resolved[index].order);
    }
    buckets.into_iter().flatten().collect()
}

/// Groups resolved tasks into phases by tier.
///
/// Returns phases in order: [TimeLimited], [Group], [Single]. Empty phases
/// are omitted.
pub fn tier_phases(resolved: &[ResolvedTask]) -> Vec<(Tier, Vec<&ResolvedTask>)> {
    let mut phases: Vec<(Tier, Vec<&ResolvedTask>)> =
        Tier::ALL.into_iter().map(|tier| (tier, Vec::new())).collect();

    for task in resolved {
        phases[task.tier.index()].1.push(task);
    }
    for (_, tasks) in &mut phases {
        tasks.sort_by_key(|task| task.order);
    }

    phases.retain(|(_, tasks)| !tasks.is_empty());
    phases
}

#[cfg(test)]
mod tests {
    use crate::models::{StepOutcome, Tier};
    use crate::orchestration::resolve_tag;
    use crate::registry::TaskRegistry;
    use crate::task;

    use super::{tier_phases, visit_sequence};

    fn registry() -> TaskRegistry {
        let mut builder = TaskRegistry::builder();
        builder
            .declare_tag("dailies", Tier::Single)
            .unwrap()
            .declare_tag("raids", Tier::Group)
            .unwrap()
            .declare_tag("events", Tier::TimeLimited)
            .unwrap();
        for (tag, name) in [
            ("dailies", "sweep"),
            ("dailies", "mail"),
            ("raids", "dragon"),
            ("events", "lantern"),
        ] {
            builder
                .register(tag, name, || task::from_fn(None, || StepOutcome::Done))
                .unwrap();
        }
        builder.build()
    }

    fn resolved_all(registry: &TaskRegistry) -> Vec<crate::orchestration::ResolvedTask> {
        let mut all = Vec::new();
        for tag in ["dailies", "raids", "events"] {
            let offset = all.len();
            all.extend(resolve_tag(tag, registry).unwrap().into_iter().map(|mut task| {
                task.order += offset;
                task
            }));
        }
        all
    }

    #[test]
    fn visit_sequence_orders_by_tier_then_plan_order() {
        let registry = registry();
        let resolved = resolved_all(&registry);
        let names: Vec<&str> = visit_sequence(&resolved)
            .into_iter()
            .map(|index| resolved[index].definition.task_name())
            .collect();

        assert_eq!(names, vec!["lantern", "dragon", "sweep", "mail"]);
    }

    #[test]
    fn visit_sequence_respects_order_not_input_position() {
        let registry = registry();
        let mut resolved = resolve_tag("dailies", &registry).unwrap();
        resolved.reverse();

        assert_eq!(visit_sequence(&resolved), vec![1, 0]);
    }

    #[test]
    fn omits_empty_phases() {
        let registry = registry();
        let dailies = resolve_tag("dailies", &registry).unwrap();
        let phases = tier_phases(&dailies);

        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].0, Tier::Single);
        assert_eq!(phases[0].1.len(), 2);
    }

    #[test]
    fn empty_input_returns_no_phases() {
        assert!(tier_phases(&[]).is_empty());
        assert!(visit_sequence(&[]).is_empty());
    }
}
