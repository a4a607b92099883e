use std::time::SystemTime;

use autoquest_core::models::{TaskPlan, TaskRecord, TaskState, TerminalStatus, Tier};
use autoquest_core::orchestration::{OrchestrationResult, ResolvedTask, RunReport};
use autoquest_core::registry::TaskRegistry;
use autoquest_core::task::Action;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Serialize)]
pub struct TagView<'a> {
    pub tag: &'a str,
    pub tier: Tier,
    pub tasks: Vec<&'a str>,
}

#[derive(Serialize)]
pub struct PhaseView {
    pub tier: Tier,
    pub tasks: Vec<String>,
}

pub fn tag_views(registry: &TaskRegistry) -> OrchestrationResult<Vec<TagView<'_>>> {
    registry
        .tags_with_tier()
        .into_iter()
        .map(|(tag, tier)| -> OrchestrationResult<TagView> {
            let tasks = registry
                .definitions(tag)?
                .iter()
                .map(|definition| definition.task_name())
                .collect();
            Ok(TagView { tag, tier, tasks })
        })
        .collect()
}

pub fn phase_views(phases: &[(Tier, Vec<&ResolvedTask>)]) -> Vec<PhaseView> {
    phases
        .iter()
        .map(|(tier, tasks)| PhaseView {
            tier: *tier,
            tasks: tasks
                .iter()
                .map(|task| {
                    format!(
                        "{}/{}",
                        task.definition.tag(),
                        task.definition.task_name()
                    )
                })
                .collect(),
        })
        .collect()
}

pub fn print_tags(tags: &[TagView<'_>]) {
    for view in tags {
        println!("{} [{}]", view.tag, view.tier);
        for task in &view.tasks {
            println!("  {task}");
        }
    }
}

pub fn print_plans(plans: &[TaskPlan]) {
    if plans.is_empty() {
        println!("no task plans");
        return;
    }
    for plan in plans {
        println!(
            "{:<12} {} ({} checked)",
            plan.id,
            plan.plan_name,
            plan.checked_items().count()
        );
    }
}

pub fn print_phases(plan_name: &str, phases: &[PhaseView]) {
    println!("{plan_name}");
    for phase in phases {
        println!("  {}:", phase.tier);
        for task in &phase.tasks {
            println!("    {task}");
        }
    }
}

pub fn print_run(report: &RunReport) {
    let state = if report.complete {
        "complete"
    } else {
        "incomplete"
    };
    println!(
        "run {} '{}': {state} after {} rounds",
        report.run_id.0, report.name, report.rounds
    );
    for task in &report.tasks {
        let round = task
            .finished_round
            .map(|round| format!(", round {round}"))
            .unwrap_or_default();
        println!(
            "  [{}] {}/{} {} ({} steps{round})",
            task.tier,
            task.tag,
            task.task_name,
            state_label(&task.state),
            task.steps
        );
    }
}

pub fn print_actions(entries: &[(u32, Action)]) {
    for line in action_lines(entries) {
        println!("{line}");
    }
}

fn action_lines(entries: &[(u32, Action)]) -> Vec<String> {
    if entries.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("dry run: {} window actions recorded", entries.len())];
    lines.extend(
        entries
            .iter()
            .map(|(window_pid, action)| format!("  window {window_pid}: {action:?}")),
    );
    lines
}

pub fn print_history(records: &[TaskRecord]) {
    if records.is_empty() {
        println!("no recorded tasks");
        return;
    }
    for record in records {
        println!(
            "{} run {} {}/{} {} ({} steps)",
            format_time(record.finished_at),
            record.run_id.0,
            record.tag,
            record.task_name,
            status_label(&record.status),
            record.steps
        );
    }
}

fn state_label(state: &TaskState) -> String {
    match state {
        TaskState::Created => "created".to_string(),
        TaskState::Running => "running".to_string(),
        TaskState::Finished(status) => status_label(status),
    }
}

fn status_label(status: &TerminalStatus) -> String {
    match status {
        TerminalStatus::Ok => "ok".to_string(),
        TerminalStatus::Error { kind, message } => format!("{}: {message}", kind.as_str()),
        TerminalStatus::Cancelled => "cancelled".to_string(),
    }
}

fn format_time(value: SystemTime) -> String {
    OffsetDateTime::from(value)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "-".to_string())
}

#[cfg(test)]
mod tests {
    use autoquest_core::task::Action;

    use super::action_lines;

    #[test]
    fn dry_run_lists_every_recorded_action() {
        let lines = action_lines(&[(7, Action::Focus), (7, Action::Click { x: 1, y: 2 })]);

        assert_eq!(
            lines,
            vec![
                "dry run: 2 window actions recorded".to_string(),
                "  window 7: Focus".to_string(),
                "  window 7: Click { x: 1, y: 2 }".to_string(),
            ]
        );
    }

    #[test]
    fn nothing_is_printed_without_actions() {
        assert!(action_lines(&[]).is_empty());
    }
}
