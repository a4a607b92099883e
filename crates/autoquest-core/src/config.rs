use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    /// Slept after a round in which no task stepped because every pending
    /// task was blocked on a resource or not ready yet. A shorter pause is
    /// used when a waiting task becomes ready sooner.
    pub idle_backoff: Duration,
    /// Slept after every other round.
    pub round_pause: Duration,
    /// Cancels whatever is still pending once this many rounds have run.
    pub max_rounds: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(25),
            round_pause: Duration::ZERO,
            max_rounds: None,
        }
    }
}

/// On-disk runtime settings. Every field is optional in the file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub plan_file: PathBuf,
    pub history_db: Option<PathBuf>,
    pub window_pid: u32,
    pub idle_backoff_ms: u64,
    pub round_pause_ms: u64,
    pub max_rounds: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            plan_file: PathBuf::from("GameTaskPlanList.json"),
            history_db: None,
            window_pid: 0,
            idle_backoff_ms: duration_millis(scheduler.idle_backoff),
            round_pause_ms: duration_millis(scheduler.round_pause),
            max_rounds: scheduler.max_rounds,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!("failed to read config '{}': {error}", path.display()),
            )
        })?;
        serde_json::from_str(&raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid config '{}': {error}", path.display()),
            )
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            round_pause: Duration::from_millis(self.round_pause_ms),
            max_rounds: self.max_rounds,
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RuntimeConfig;

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "windowPid": 4242, "maxRounds": 50 }"#).unwrap();

        assert_eq!(config.window_pid, 4242);
        assert_eq!(config.max_rounds, Some(50));
        assert_eq!(config.plan_file, RuntimeConfig::default().plan_file);
        assert_eq!(config.scheduler().idle_backoff, Duration::from_millis(25));
    }
}
