use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use autoquest_core::catalog::builtin_registry;
use autoquest_core::config::RuntimeConfig;
use autoquest_core::models::{CoreError, CoreErrorKind};
use autoquest_core::orchestration::{AutomationRuntime, OrchestrationResult, RunHandle};
use autoquest_core::persistence::{JsonPlanStore, RunStore};
use autoquest_core::sqlite::SqliteStore;
use autoquest_core::task::{Action, ActionDriver};
use lazy_static::lazy_static;
use serde::Serialize;

/// Performs one window action for the UI process. Receives the window pid
/// and the action as a JSON object; returns false when the action failed.
pub type ActionCallback = extern "C" fn(window_pid: u32, action_json: *const c_char) -> bool;

/// Finished runs whose final report stays readable through `autoquest_run_status`.
const RETAINED_FINISHED_RUNS: usize = 64;

struct AutoquestState {
    runtime: AutomationRuntime,
    history: Option<Arc<SqliteStore>>,
    runs: HashMap<u64, RunHandle>,
    tokio_rt: tokio::runtime::Runtime,
}

lazy_static! {
    static ref STATE: Mutex<Option<AutoquestState>> = Mutex::new(None);
    static ref ACTION_CALLBACK: RwLock<Option<ActionCallback>> = RwLock::new(None);
}

struct CallbackDriver;

impl ActionDriver for CallbackDriver {
    fn perform(&self, window_pid: u32, action: &Action) -> Result<(), CoreError> {
        let callback = *ACTION_CALLBACK
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(callback) = callback else {
            return Err(CoreError::new(
                CoreErrorKind::ActionFailure,
                "no action callback registered",
            ));
        };

        let payload = serde_json::to_string(action).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InternalFault,
                format!("failed to encode action: {error}"),
            )
        })?;
        let payload = CString::new(payload).map_err(|error| {
            CoreError::new(CoreErrorKind::InternalFault, error.to_string())
        })?;

        if callback(window_pid, payload.as_ptr()) {
            Ok(())
        } else {
            Err(CoreError::new(
                CoreErrorKind::ActionFailure,
                "action callback reported failure",
            ))
        }
    }
}

/// Initialize the automation engine from a JSON config file. A null path
/// uses the default configuration.
///
/// # Safety
///
/// `config_path` must be null or a valid pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn autoquest_init(config_path: *const c_char) -> bool {
    if lock_state().is_some() {
        return true;
    }

    autoquest_core::logging::init_tracing("info");

    let config = if config_path.is_null() {
        RuntimeConfig::default()
    } else {
        let Some(path) = (unsafe { c_str_arg(config_path) }) else {
            return false;
        };
        match RuntimeConfig::load(Path::new(path)) {
            Ok(config) => config,
            Err(error) => {
                tracing::error!(kind = ?error.kind, message = %error.message, "failed to load config");
                return false;
            }
        }
    };

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            tracing::error!(%error, "failed to create tokio runtime");
            return false;
        }
    };

    let (runtime, history) = match build_runtime(&config) {
        Ok(built) => built,
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to initialize runtime");
            return false;
        }
    };

    *lock_state() = Some(AutoquestState {
        runtime,
        history,
        runs: HashMap::new(),
        tokio_rt,
    });
    tracing::info!(window_pid = config.window_pid, "autoquest initialized");
    true
}

fn build_runtime(
    config: &RuntimeConfig,
) -> OrchestrationResult<(AutomationRuntime, Option<Arc<SqliteStore>>)> {
    let registry = builtin_registry(Arc::new(CallbackDriver), config.window_pid)?;
    let plans = Arc::new(JsonPlanStore::new(&config.plan_file));
    let mut runtime =
        AutomationRuntime::new(Arc::new(registry), plans).with_config(config.scheduler());

    let history = match &config.history_db {
        Some(path) => {
            let store = Arc::new(SqliteStore::new(path));
            store.migrate_to_latest()?;
            runtime = runtime.with_run_store(store.clone())?;
            Some(store)
        }
        None => None,
    };
    Ok((runtime, history))
}

/// Register the callback that performs window actions. Null clears it.
#[unsafe(no_mangle)]
pub extern "C" fn autoquest_set_action_callback(callback: Option<ActionCallback>) {
    *ACTION_CALLBACK
        .write()
        .unwrap_or_else(PoisonError::into_inner) = callback;
}

/// Start a run of every task under `tag`. Returns the run id, or -1.
///
/// # Safety
///
/// `tag` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn autoquest_run_tag(tag: *const c_char) -> i64 {
    let Some(tag) = (unsafe { c_str_arg(tag) }) else {
        return -1;
    };
    start_run(|runtime| runtime.run_tag(tag))
}

/// Start a run of a stored plan. Returns the run id, or -1.
///
/// # Safety
///
/// `plan_id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn autoquest_run_plan(plan_id: *const c_char) -> i64 {
    let Some(plan_id) = (unsafe { c_str_arg(plan_id) }) else {
        return -1;
    };
    start_run(|runtime| runtime.run_plan(plan_id))
}

fn start_run(start: impl FnOnce(&AutomationRuntime) -> OrchestrationResult<RunHandle>) -> i64 {
    let mut guard = lock_state();
    let Some(state) = guard.as_mut() else {
        return -1;
    };

    let _entered = state.tokio_rt.enter();
    let handle = match start(&state.runtime) {
        Ok(handle) => handle,
        Err(error) => {
            tracing::warn!(kind = ?error.kind, message = %error.message, "run could not be started");
            return -1;
        }
    };

    let run_id = handle.run_id().0;
    tracing::debug!(run_id, name = %handle.name(), "run registered");
    state.runs.insert(run_id, handle);
    evict_finished_runs(&mut state.runs, RETAINED_FINISHED_RUNS, RunHandle::is_complete);
    i64::try_from(run_id).unwrap_or(-1)
}

/// Current report of a run as JSON, or null for an unknown run.
#[unsafe(no_mangle)]
pub extern "C" fn autoquest_run_status(run_id: u64) -> *mut c_char {
    let guard = lock_state();
    let Some(run) = guard.as_ref().and_then(|state| state.runs.get(&run_id)) else {
        return std::ptr::null_mut();
    };
    json_string(&run.snapshot())
}

/// Cancel every pending task of a run.
#[unsafe(no_mangle)]
pub extern "C" fn autoquest_cancel_run(run_id: u64) -> bool {
    let guard = lock_state();
    match guard.as_ref().and_then(|state| state.runs.get(&run_id)) {
        Some(run) => {
            run.cancel_all();
            true
        }
        None => false,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn autoquest_list_plans() -> *mut c_char {
    let guard = lock_state();
    let Some(state) = guard.as_ref() else {
        return std::ptr::null_mut();
    };

    match state.runtime.plans().list_plans() {
        Ok(plans) => json_string(&plans),
        Err(error) => {
            tracing::warn!(kind = ?error.kind, message = %error.message, "failed to list plans");
            std::ptr::null_mut()
        }
    }
}

/// Most recent task records as JSON. Null when history is not configured.
#[unsafe(no_mangle)]
pub extern "C" fn autoquest_list_history(limit: u32) -> *mut c_char {
    let guard = lock_state();
    let Some(history) = guard.as_ref().and_then(|state| state.history.as_ref()) else {
        return std::ptr::null_mut();
    };

    match history.list_recent_task_records(limit as usize) {
        Ok(records) => json_string(&records),
        Err(error) => {
            tracing::warn!(kind = ?error.kind, message = %error.message, "failed to list history");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by an `autoquest_*` function.
///
/// # Safety
///
/// `s` must be a pointer previously returned by an `autoquest_*` function, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn autoquest_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}

/// Drops the oldest finished runs beyond `keep`. Running runs are never dropped.
fn evict_finished_runs<R>(
    runs: &mut HashMap<u64, R>,
    keep: usize,
    is_complete: impl Fn(&R) -> bool,
) {
    let mut finished: Vec<u64> = runs
        .iter()
        .filter(|(_, run)| is_complete(run))
        .map(|(run_id, _)| *run_id)
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    for run_id in &finished[..finished.len() - keep] {
        runs.remove(run_id);
    }
}

fn lock_state() -> MutexGuard<'static, Option<AutoquestState>> {
    STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

unsafe fn c_str_arg<'a>(raw: *const c_char) -> Option<&'a str> {
    if raw.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(raw) }.to_str().ok()
}

fn json_string<T: Serialize + ?Sized>(value: &T) -> *mut c_char {
    let Ok(json) = serde_json::to_string(value) else {
        return std::ptr::null_mut();
    };
    match CString::new(json) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}
