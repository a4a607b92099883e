use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use autoquest_core::config::SchedulerConfig;
use autoquest_core::models::{
    CoreErrorKind, PlanGroup, PlanItem, ResourceKey, StepOutcome, TaskPlan, TerminalStatus, Tier,
};
use autoquest_core::orchestration::AutomationRuntime;
use autoquest_core::persistence::InMemoryPlanStore;
use autoquest_core::registry::{TaskRegistry, TaskRegistryBuilder};
use autoquest_core::task;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct WindowProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    steps: AtomicUsize,
    instantiated: AtomicUsize,
}

fn register_windowed(
    builder: &mut TaskRegistryBuilder,
    tag: &str,
    name: &'static str,
    steps_needed: usize,
    probe: &Arc<WindowProbe>,
) {
    let probe = probe.clone();
    builder
        .register(tag, name, move || {
            probe.instantiated.fetch_add(1, Ordering::SeqCst);
            let probe = probe.clone();
            let mut calls = 0;
            task::from_fn(Some(ResourceKey::window(4242)), move || {
                let active = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
                probe.peak.fetch_max(active, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                probe.active.fetch_sub(1, Ordering::SeqCst);
                probe.steps.fetch_add(1, Ordering::SeqCst);

                calls += 1;
                if calls >= steps_needed {
                    StepOutcome::Done
                } else {
                    StepOutcome::Suspended
                }
            })
        })
        .unwrap();
}

fn register_endless(builder: &mut TaskRegistryBuilder, tag: &str, name: &'static str) {
    builder
        .register(tag, name, || {
            task::from_fn(None, || {
                thread::sleep(Duration::from_millis(1));
                StepOutcome::Suspended
            })
        })
        .unwrap();
}

fn runtime(registry: TaskRegistry, plans: Vec<TaskPlan>) -> AutomationRuntime {
    let plans = InMemoryPlanStore::with_plans(plans).unwrap();
    AutomationRuntime::new(Arc::new(registry), Arc::new(plans)).with_config(SchedulerConfig {
        idle_backoff: Duration::from_millis(1),
        ..SchedulerConfig::default()
    })
}

fn standard_registry(probe: &Arc<WindowProbe>) -> TaskRegistry {
    let mut builder = TaskRegistry::builder();
    builder.declare_tag("daily-routine", Tier::Single).unwrap();
    builder.declare_tag("team-dungeons", Tier::Group).unwrap();
    builder.declare_tag("idle", Tier::Single).unwrap();
    register_windowed(&mut builder, "daily-routine", "sign-in", 3, probe);
    register_windowed(&mut builder, "daily-routine", "master-quest", 2, probe);
    register_windowed(&mut builder, "team-dungeons", "ghost-hunt", 4, probe);
    register_endless(&mut builder, "idle", "wait-for-stamina");
    builder.build()
}

#[tokio::test]
async fn run_tag_steps_every_task_to_completion() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let handle = runtime.run_tag("daily-routine").unwrap();
    let report = handle.wait_timeout(WAIT).await.unwrap();

    assert!(report.complete);
    assert!(report.succeeded());
    assert_eq!(report.name, "daily-routine");
    assert_eq!(report.tasks.len(), 2);
    assert_eq!(report.rounds, 3);
    assert_eq!(probe.steps.load(Ordering::SeqCst), 5);
    assert!(handle.is_complete());
    assert_eq!(runtime.locks().holder(&ResourceKey::window(4242)), None);
}

#[tokio::test]
async fn run_plan_uses_stored_plan_and_its_display_name() {
    let probe = Arc::new(WindowProbe::default());
    let plan = TaskPlan {
        id: "evening".to_string(),
        plan_name: "Evening routine".to_string(),
        groups: vec![
            PlanGroup {
                tag: "daily-routine".to_string(),
                items: vec![
                    PlanItem {
                        task_name: "sign-in".to_string(),
                        checked: false,
                    },
                    PlanItem {
                        task_name: "master-quest".to_string(),
                        checked: true,
                    },
                ],
            },
            PlanGroup {
                tag: "team-dungeons".to_string(),
                items: vec![PlanItem {
                    task_name: "ghost-hunt".to_string(),
                    checked: true,
                }],
            },
        ],
    };
    let runtime = runtime(standard_registry(&probe), vec![plan]);

    let report = runtime
        .run_plan("evening")
        .unwrap()
        .wait_timeout(WAIT)
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.name, "Evening routine");
    let names: Vec<&str> = report.tasks.iter().map(|task| task.task_name.as_str()).collect();
    assert_eq!(names, vec!["master-quest", "ghost-hunt"]);
    assert_eq!(report.task_named("daily-routine", "master-quest").unwrap().finished_round, Some(2));
    assert_eq!(report.task_named("team-dungeons", "ghost-hunt").unwrap().finished_round, Some(4));
}

#[tokio::test]
async fn missing_plan_and_unknown_tag_are_rejected_up_front() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let error = runtime.run_plan("nope").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);

    let error = runtime.run_tag("weekly-raids").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownTag);
    assert_eq!(probe.instantiated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_runs_never_step_the_same_window_at_once() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let batch = runtime
        .run_many(["daily-routine", "team-dungeons"])
        .unwrap();
    assert_eq!(batch.runs().len(), 2);
    assert_ne!(batch.runs()[0].run_id(), batch.runs()[1].run_id());

    let report = batch.wait_timeout(WAIT).await.unwrap();
    assert!(report.is_complete());
    assert!(report.succeeded());
    assert_eq!(probe.steps.load(Ordering::SeqCst), 3 + 2 + 4);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_many_with_unknown_tag_starts_nothing() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let error = runtime
        .run_many(["daily-routine", "weekly-raids"])
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::UnknownTag);
    assert_eq!(probe.instantiated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_all_finishes_pending_tasks_as_cancelled() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let handle = runtime.run_tag("idle").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_complete());

    assert_eq!(handle.cancel_all(), 1);
    let report = handle.wait_timeout(WAIT).await.unwrap();
    assert!(report.complete);
    assert_eq!(
        report.tasks[0].terminal_status(),
        Some(&TerminalStatus::Cancelled)
    );
    assert!(report.succeeded());

    assert_eq!(handle.cancel_all(), 0);
}

#[tokio::test]
async fn cancelled_run_does_not_disturb_another_run() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let batch = runtime.run_many(["idle", "daily-routine"]).unwrap();
    batch.runs()[0].cancel_all();

    let report = batch.wait_timeout(WAIT).await.unwrap();
    assert_eq!(
        report.runs[0].tasks[0].terminal_status(),
        Some(&TerminalStatus::Cancelled)
    );
    assert!(report.runs[1].succeeded());
}

#[tokio::test]
async fn wait_timeout_reports_timeout_while_run_continues() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let handle = runtime.run_tag("idle").unwrap();
    let error = handle
        .wait_timeout(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert!(!handle.snapshot().complete);

    handle.cancel_all();
    assert!(handle.wait_timeout(WAIT).await.unwrap().complete);
}

#[tokio::test]
async fn run_ids_increase_across_runs() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let first = runtime.run_tag("daily-routine").unwrap();
    let second = runtime.run_tag("daily-routine").unwrap();
    assert!(second.run_id() > first.run_id());

    first.wait_timeout(WAIT).await.unwrap();
    second.wait_timeout(WAIT).await.unwrap();
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn starting_a_run_outside_tokio_fails() {
    let probe = Arc::new(WindowProbe::default());
    let runtime = runtime(standard_registry(&probe), Vec::new());

    let error = runtime.run_tag("daily-routine").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InternalFault);
}
