use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub task_name: String,
    pub checked: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanGroup {
    pub tag: String,
    #[serde(rename = "taskList")]
    pub items: Vec<PlanItem>,
}

/// A persisted, named selection of tasks. Field names follow the plan
/// document written by the desktop UI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: String,
    #[serde(rename = "planName")]
    pub plan_name: String,
    #[serde(rename = "gameTaskList")]
    pub groups: Vec<PlanGroup>,
}

impl TaskPlan {
    pub fn checked_items(&self) -> impl Iterator<Item = (&str, &PlanItem)> {
        self.groups.iter().flat_map(|group| {
            group
                .items
                .iter()
                .filter(|item| item.checked)
                .map(move |item| (group.tag.as_str(), item))
        })
    }
}
