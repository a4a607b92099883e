use std::sync::Arc;
use std::thread;
use std::time::Duration;

use autoquest_core::catalog::builtin_registry;
use autoquest_core::models::{CoreError, CoreErrorKind, ResourceKey, StepOutcome, Tier};
use autoquest_core::task::{
    self, Action, ActionDriver, RecordingDriver, ScriptedTask, Task, TaskCell, WithDeadline,
};

struct RefusingDriver;

impl ActionDriver for RefusingDriver {
    fn perform(&self, _window_pid: u32, action: &Action) -> Result<(), CoreError> {
        match action {
            Action::ExpectPixel { .. } => Err(CoreError::new(
                CoreErrorKind::ActionFailure,
                "pixel color mismatch",
            )),
            _ => Ok(()),
        }
    }
}

#[test]
fn scripted_task_performs_one_action_per_step() {
    let driver = RecordingDriver::new();
    let mut task = ScriptedTask::new(
        31,
        vec![
            Action::Focus,
            Action::Click { x: 10, y: 20 },
            Action::KeyPress {
                key: "escape".to_string(),
            },
        ],
        Arc::new(driver.clone()),
    );

    assert_eq!(task.resource_key(), Some(&ResourceKey::window(31)));
    assert_eq!(task.step(), StepOutcome::Suspended);
    assert_eq!(driver.entries(), vec![(31, Action::Focus)]);
    assert_eq!(task.step(), StepOutcome::Suspended);
    assert_eq!(task.remaining(), 1);
    assert_eq!(task.step(), StepOutcome::Done);
    assert_eq!(driver.entries().len(), 3);
}

#[test]
fn wait_action_suspends_without_touching_the_window() {
    let driver = RecordingDriver::new();
    let mut task = ScriptedTask::new(
        31,
        vec![Action::Wait { millis: 30 }, Action::Focus],
        Arc::new(driver.clone()),
    );

    assert_eq!(task.step(), StepOutcome::Suspended);
    assert_eq!(task.step(), StepOutcome::Suspended);
    assert!(driver.entries().is_empty());

    thread::sleep(Duration::from_millis(40));
    assert_eq!(task.step(), StepOutcome::Done);
    assert_eq!(driver.entries(), vec![(31, Action::Focus)]);
}

#[test]
fn empty_script_is_done_immediately() {
    let mut task = ScriptedTask::new(1, Vec::new(), Arc::new(RecordingDriver::new()));
    assert_eq!(task.step(), StepOutcome::Done);
}

#[test]
fn driver_failure_ends_task_with_action_failure() {
    let mut task = ScriptedTask::new(
        5,
        vec![
            Action::Focus,
            Action::ExpectPixel {
                x: 1,
                y: 2,
                rgb: [0, 0, 0],
            },
            Action::Click { x: 1, y: 2 },
        ],
        Arc::new(RefusingDriver),
    );

    assert_eq!(task.step(), StepOutcome::Suspended);
    match task.step() {
        StepOutcome::DoneWithError(kind, message) => {
            assert_eq!(kind, CoreErrorKind::ActionFailure);
            assert!(message.contains("pixel color mismatch"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn deadline_turns_an_overdue_task_into_timeout() {
    let mut task = WithDeadline::new(
        task::from_fn(Some(ResourceKey::new("emulator:1")), || StepOutcome::Suspended),
        Duration::from_millis(20),
    );

    assert_eq!(task.resource_key(), Some(&ResourceKey::new("emulator:1")));
    assert_eq!(task.step(), StepOutcome::Suspended);
    thread::sleep(Duration::from_millis(30));
    match task.step() {
        StepOutcome::DoneWithError(kind, message) => {
            assert_eq!(kind, CoreErrorKind::Timeout);
            assert!(message.contains("deadline of 20ms"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn task_cell_rejects_steps_after_terminal_outcome() {
    let mut cell = TaskCell::new(Box::new(task::from_fn(None, || StepOutcome::Done)));

    assert_eq!(cell.step().unwrap(), StepOutcome::Done);
    assert!(cell.is_finished());
    assert_eq!(cell.step().unwrap_err().kind, CoreErrorKind::InvalidState);
}

#[test]
fn task_cell_contains_panics() {
    let mut cell = TaskCell::new(Box::new(task::from_fn(None, || -> StepOutcome {
        panic!("lost the window handle")
    })));

    match cell.step().unwrap() {
        StepOutcome::DoneWithError(kind, message) => {
            assert_eq!(kind, CoreErrorKind::InternalFault);
            assert!(message.contains("lost the window handle"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(cell.is_finished());
}

#[test]
fn actions_serialize_with_an_action_tag() {
    let json = serde_json::to_string(&Action::Click { x: 3, y: 4 }).unwrap();
    assert_eq!(json, r#"{"action":"click","x":3,"y":4}"#);
}

#[test]
fn builtin_catalog_declares_every_tier() {
    let registry = builtin_registry(Arc::new(RecordingDriver::new()), 77).unwrap();

    assert_eq!(
        registry.tags_with_tier(),
        vec![
            ("limited-events", Tier::TimeLimited),
            ("team-dungeons", Tier::Group),
            ("daily-routine", Tier::Single),
        ]
    );
    assert_eq!(registry.definitions("daily-routine").unwrap().len(), 3);
}

#[test]
fn builtin_tasks_drive_the_configured_window() {
    let driver = RecordingDriver::new();
    let registry = builtin_registry(Arc::new(driver.clone()), 77).unwrap();
    let mut sign_in = registry.lookup("daily-routine", "sign-in").unwrap().instantiate();

    assert_eq!(sign_in.resource_key(), Some(&ResourceKey::window(77)));
    let mut steps = 0;
    while sign_in.step() == StepOutcome::Suspended {
        steps += 1;
        assert!(steps < 10);
    }

    let entries = driver.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|(pid, _)| *pid == 77));
    assert_eq!(entries[0].1, Action::Focus);
}
