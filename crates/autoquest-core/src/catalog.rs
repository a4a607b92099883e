use std::sync::Arc;
use std::time::Duration;

use crate::models::Tier;
use crate::orchestration::OrchestrationResult;
use crate::registry::TaskRegistry;
use crate::task::{Action, ActionDriver, ScriptedTask, WithDeadline};

struct CatalogTask {
    name: &'static str,
    script: fn() -> Vec<Action>,
}

struct CatalogTag {
    tag: &'static str,
    tier: Tier,
    deadline: Option<Duration>,
    tasks: &'static [CatalogTask],
}

const LIMITED_EVENT_TASKS: &[CatalogTask] = &[
    CatalogTask {
        name: "treasure-map",
        script: treasure_map,
    },
    CatalogTask {
        name: "lantern-riddles",
        script: lantern_riddles,
    },
];

const TEAM_DUNGEON_TASKS: &[CatalogTask] = &[
    CatalogTask {
        name: "ghost-hunt",
        script: ghost_hunt,
    },
    CatalogTask {
        name: "dungeon-run",
        script: dungeon_run,
    },
];

const DAILY_ROUTINE_TASKS: &[CatalogTask] = &[
    CatalogTask {
        name: "start-game",
        script: start_game,
    },
    CatalogTask {
        name: "sign-in",
        script: sign_in,
    },
    CatalogTask {
        name: "master-quest",
        script: master_quest,
    },
];

const CATALOG: [CatalogTag; 3] = [
    CatalogTag {
        tag: "limited-events",
        tier: Tier::TimeLimited,
        deadline: Some(Duration::from_secs(30 * 60)),
        tasks: LIMITED_EVENT_TASKS,
    },
    CatalogTag {
        tag: "team-dungeons",
        tier: Tier::Group,
        deadline: None,
        tasks: TEAM_DUNGEON_TASKS,
    },
    CatalogTag {
        tag: "daily-routine",
        tier: Tier::Single,
        deadline: None,
        tasks: DAILY_ROUTINE_TASKS,
    },
];

/// Builds the registry of built-in scripted tasks, all bound to one game
/// window. Time-limited tags wrap their tasks in a deadline.
pub fn builtin_registry(
    driver: Arc<dyn ActionDriver>,
    window_pid: u32,
) -> OrchestrationResult<TaskRegistry> {
    let mut builder = TaskRegistry::builder();

    for entry in &CATALOG {
        builder.declare_tag(entry.tag, entry.tier)?;
        for task in entry.tasks {
            let driver = driver.clone();
            let script = task.script;
            match entry.deadline {
                Some(budget) => builder.register(entry.tag, task.name, move || {
                    WithDeadline::new(
                        ScriptedTask::new(window_pid, script(), driver.clone()),
                        budget,
                    )
                })?,
                None => builder.register(entry.tag, task.name, move || {
                    ScriptedTask::new(window_pid, script(), driver.clone())
                })?,
            };
        }
    }

    Ok(builder.build())
}

fn treasure_map() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::KeyPress { key: "alt+e".into() },
        Action::Click { x: 412, y: 308 },
        Action::Wait { millis: 800 },
        Action::ExpectPixel {
            x: 640,
            y: 360,
            rgb: [236, 200, 96],
        },
        Action::Click { x: 640, y: 360 },
    ]
}

fn lantern_riddles() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::Click { x: 980, y: 120 },
        Action::Wait { millis: 500 },
        Action::Click { x: 560, y: 420 },
        Action::Click { x: 560, y: 470 },
    ]
}

fn ghost_hunt() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::KeyPress { key: "alt+t".into() },
        Action::Click { x: 300, y: 220 },
        Action::Wait { millis: 1500 },
        Action::Click { x: 702, y: 515 },
    ]
}

fn dungeon_run() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::Click { x: 1100, y: 160 },
        Action::Wait { millis: 1000 },
        Action::ExpectPixel {
            x: 520,
            y: 300,
            rgb: [180, 40, 40],
        },
        Action::Click { x: 520, y: 300 },
    ]
}

fn start_game() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::Click { x: 640, y: 600 },
        Action::Wait { millis: 2000 },
        Action::Click { x: 640, y: 520 },
    ]
}

fn sign_in() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::Click { x: 1180, y: 90 },
        Action::Click { x: 610, y: 440 },
        Action::KeyPress { key: "escape".into() },
    ]
}

fn master_quest() -> Vec<Action> {
    vec![
        Action::Focus,
        Action::KeyPress { key: "alt+q".into() },
        Action::Click { x: 350, y: 260 },
        Action::Wait { millis: 1200 },
        Action::MoveCursor { x: 700, y: 400 },
        Action::Click { x: 700, y: 400 },
    ]
}
