use autoquest_core::models::{CoreErrorKind, StepOutcome, Tier};
use autoquest_core::registry::TaskRegistry;
use autoquest_core::task::{self, Task};

fn noop() -> impl Task {
    task::from_fn(None, || StepOutcome::Done)
}

#[test]
fn lookup_finds_registered_definitions() {
    let mut builder = TaskRegistry::builder();
    builder
        .declare_tag("dailies", Tier::Single)
        .unwrap()
        .declare_tag("events", Tier::TimeLimited)
        .unwrap();
    builder
        .register("dailies", "sign-in", noop)
        .unwrap()
        .register("dailies", "master-quest", noop)
        .unwrap();
    let registry = builder.build();

    let definition = registry.lookup("dailies", "master-quest").unwrap();
    assert_eq!(definition.tag(), "dailies");
    assert_eq!(definition.task_name(), "master-quest");
    assert_eq!(registry.tier("events").unwrap(), Tier::TimeLimited);

    let names: Vec<&str> = registry
        .definitions("dailies")
        .unwrap()
        .iter()
        .map(|definition| definition.task_name())
        .collect();
    assert_eq!(names, vec!["sign-in", "master-quest"]);
    assert!(registry.definitions("events").unwrap().is_empty());
    assert_eq!(
        registry.tags_with_tier(),
        vec![("dailies", Tier::Single), ("events", Tier::TimeLimited)]
    );
}

#[test]
fn same_task_name_may_live_under_different_tags() {
    let mut builder = TaskRegistry::builder();
    builder.declare_tag("dailies", Tier::Single).unwrap();
    builder.declare_tag("weeklies", Tier::Single).unwrap();
    builder.register("dailies", "sign-in", noop).unwrap();
    builder.register("weeklies", "sign-in", noop).unwrap();
    let registry = builder.build();

    assert!(registry.lookup("dailies", "sign-in").is_ok());
    assert!(registry.lookup("weeklies", "sign-in").is_ok());
}

#[test]
fn duplicate_tag_and_duplicate_task_are_rejected() {
    let mut builder = TaskRegistry::builder();
    builder.declare_tag("dailies", Tier::Single).unwrap();

    let error = builder.declare_tag("dailies", Tier::Group).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::DuplicateDefinition);
    assert_eq!(error.tag.as_deref(), Some("dailies"));

    builder.register("dailies", "sign-in", noop).unwrap();
    let error = builder.register("dailies", "sign-in", noop).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::DuplicateDefinition);
    assert_eq!(error.task_name.as_deref(), Some("sign-in"));
    assert!(error.kind.is_configuration());

    let registry = builder.build();
    assert_eq!(registry.tier("dailies").unwrap(), Tier::Single);
    assert_eq!(registry.definitions("dailies").unwrap().len(), 1);
}

#[test]
fn registering_under_undeclared_tag_fails() {
    let mut builder = TaskRegistry::builder();
    let error = builder.register("raids", "dragon", noop).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownTag);
}

#[test]
fn unknown_lookups_distinguish_tag_from_task() {
    let mut builder = TaskRegistry::builder();
    builder.declare_tag("dailies", Tier::Single).unwrap();
    builder.register("dailies", "sign-in", noop).unwrap();
    let registry = builder.build();

    assert_eq!(
        registry.lookup("raids", "sign-in").unwrap_err().kind,
        CoreErrorKind::UnknownTag
    );
    assert_eq!(
        registry.lookup("dailies", "sweep").unwrap_err().kind,
        CoreErrorKind::UnknownTask
    );
    assert_eq!(registry.tier("raids").unwrap_err().kind, CoreErrorKind::UnknownTag);
    assert!(!registry.contains_tag("raids"));
}

#[test]
fn each_instantiation_yields_a_fresh_task() {
    let mut builder = TaskRegistry::builder();
    builder.declare_tag("dailies", Tier::Single).unwrap();
    builder
        .register("dailies", "two-steps", || {
            let mut calls = 0;
            task::from_fn(None, move || {
                calls += 1;
                if calls == 2 {
                    StepOutcome::Done
                } else {
                    StepOutcome::Suspended
                }
            })
        })
        .unwrap();
    let registry = builder.build();
    let definition = registry.lookup("dailies", "two-steps").unwrap();

    let mut first = definition.instantiate();
    assert_eq!(first.step(), StepOutcome::Suspended);
    let mut second = definition.instantiate();
    assert_eq!(second.step(), StepOutcome::Suspended);
    assert_eq!(first.step(), StepOutcome::Done);
}
