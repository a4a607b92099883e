mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use autoquest_core::catalog::builtin_registry;
use autoquest_core::config::RuntimeConfig;
use autoquest_core::orchestration::{
    AutomationRuntime, BatchHandle, BatchReport, RunHandle, RunReport, resolve, tier_phases,
};
use autoquest_core::persistence::{JsonPlanStore, RunStore};
use autoquest_core::sqlite::SqliteStore;
use autoquest_core::task::RecordingDriver;
use clap::{Parser, Subcommand};

/// Runs the built-in game tasks against a recording driver: every window
/// action is logged instead of being sent to a game client.
#[derive(Debug, Parser)]
#[command(name = "autoquest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tiered round-robin runner for game window tasks")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Runtime configuration file (JSON)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,
    /// Task plan file, overrides the configured one
    #[arg(long = "plans", global = true, value_name = "FILE")]
    plans: Option<PathBuf>,
    /// Run history database, overrides the configured one
    #[arg(long = "history", global = true, value_name = "FILE")]
    history: Option<PathBuf>,
    /// Game window process id
    #[arg(short = 'w', long = "window", global = true, value_name = "PID")]
    window: Option<u32>,
    /// Print machine readable JSON
    #[arg(long = "json", global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List declared tags with their tier and tasks
    Tags,
    /// List stored task plans
    Plans,
    /// Show how a stored plan resolves into tier phases
    Plan {
        id: String,
    },
    /// Run every task under one tag
    RunTag {
        tag: String,
    },
    /// Run a stored task plan
    RunPlan {
        id: String,
    },
    /// Run several tags concurrently, one run per tag
    RunMany {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Show recorded task outcomes
    History {
        /// Only records of this run
        #[arg(long = "run")]
        run: Option<u64>,
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },
}

struct App {
    runtime: AutomationRuntime,
    history: Option<Arc<SqliteStore>>,
    driver: RecordingDriver,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    autoquest_core::logging::init_tracing("warn");
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(plans) = cli.plans {
        config.plan_file = plans;
    }
    if let Some(history) = cli.history {
        config.history_db = Some(history);
    }
    if let Some(window) = cli.window {
        config.window_pid = window;
    }

    let app = App::new(&config, cli.json)?;
    app.execute(cli.command).await
}

impl App {
    fn new(config: &RuntimeConfig, json: bool) -> anyhow::Result<Self> {
        let driver = RecordingDriver::new();
        let registry = builtin_registry(Arc::new(driver.clone()), config.window_pid)?;
        let plans = Arc::new(JsonPlanStore::new(&config.plan_file));
        let mut runtime =
            AutomationRuntime::new(Arc::new(registry), plans).with_config(config.scheduler());

        let history = match &config.history_db {
            Some(path) => {
                let store = Arc::new(SqliteStore::new(path));
                store
                    .migrate_to_latest()
                    .with_context(|| format!("opening history '{}'", path.display()))?;
                runtime = runtime.with_run_store(store.clone())?;
                Some(store)
            }
            None => None,
        };

        Ok(Self {
            runtime,
            history,
            driver,
            json,
        })
    }

    async fn execute(&self, command: Command) -> anyhow::Result<ExitCode> {
        match command {
            Command::Tags => {
                let tags = render::tag_views(self.runtime.registry())?;
                self.print(&tags, || render::print_tags(&tags))?;
            }
            Command::Plans => {
                let plans = self.runtime.plans().list_plans()?;
                self.print(&plans, || render::print_plans(&plans))?;
            }
            Command::Plan { id } => {
                let Some(plan) = self.runtime.plans().plan(&id)? else {
                    bail!("no task plan with id '{id}'");
                };
                let resolved = resolve(&plan, self.runtime.registry())?;
                let phases = render::phase_views(&tier_phases(&resolved));
                self.print(&phases, || render::print_phases(&plan.plan_name, &phases))?;
            }
            Command::RunTag { tag } => {
                let report = wait_run(&self.runtime.run_tag(&tag)?).await;
                return self.finish_run(report);
            }
            Command::RunPlan { id } => {
                let report = wait_run(&self.runtime.run_plan(&id)?).await;
                return self.finish_run(report);
            }
            Command::RunMany { tags } => {
                let report = wait_batch(&self.runtime.run_many(&tags)?).await;
                self.print(&report, || {
                    for run in &report.runs {
                        render::print_run(run);
                    }
                })?;
                self.report_actions();
                return Ok(exit_code(report.succeeded()));
            }
            Command::History { run, limit } => {
                let Some(history) = &self.history else {
                    bail!("no history database configured; pass --history or set historyDb");
                };
                let records = match run {
                    Some(run_id) => history.list_run(run_id)?,
                    None => history.list_recent_task_records(limit)?,
                };
                self.print(&records, || render::print_history(&records))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn finish_run(&self, report: RunReport) -> anyhow::Result<ExitCode> {
        self.print(&report, || render::print_run(&report))?;
        self.report_actions();
        Ok(exit_code(report.succeeded()))
    }

    fn print<T: serde::Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce(),
    ) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    /// Shows the window actions the recording driver captured instead of
    /// performing them.
    fn report_actions(&self) {
        let entries = self.driver.entries();
        for (window_pid, action) in &entries {
            tracing::info!(window_pid, action = ?action, "dry-run action");
        }
        if !self.json {
            render::print_actions(&entries);
        }
    }
}

async fn wait_run(handle: &RunHandle) -> RunReport {
    tokio::select! {
        report = handle.wait() => report,
        _ = tokio::signal::ctrl_c() => {
            let cancelled = handle.cancel_all();
            tracing::warn!(run_id = handle.run_id().0, cancelled, "interrupted, cancelling run");
            handle.wait().await
        }
    }
}

async fn wait_batch(batch: &BatchHandle) -> BatchReport {
    tokio::select! {
        report = batch.wait() => report,
        _ = tokio::signal::ctrl_c() => {
            let cancelled = batch.cancel_all();
            tracing::warn!(runs = batch.runs().len(), cancelled, "interrupted, cancelling batch");
            batch.wait().await
        }
    }
}

fn exit_code(succeeded: bool) -> ExitCode {
    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
