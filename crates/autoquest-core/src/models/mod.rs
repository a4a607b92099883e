pub mod error;
pub mod plan;
pub mod resource;
pub mod task;
pub mod tier;

pub use error::{CoreError, CoreErrorKind};
pub use plan::{PlanGroup, PlanItem, TaskPlan};
pub use resource::ResourceKey;
pub use task::{RunId, StepOutcome, TaskId, TaskRecord, TaskState, TerminalStatus};
pub use tier::Tier;
