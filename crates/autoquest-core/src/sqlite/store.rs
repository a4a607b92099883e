use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, Row, params};

use crate::models::{
    CoreError, CoreErrorKind, RunId, TaskId, TaskRecord, TerminalStatus, Tier,
};
use crate::persistence::{MigrationStore, PersistenceResult, RunStore};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "autoquest_schema_migrations";

const TASK_RECORD_COLUMNS: &str = "run_id, task_id, run_name, tag, task_name, tier, status, \
     error_kind, error_message, steps, finished_at_unix";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // DDL is idempotent; re-applying repairs a schema whose
                // version row survived but whose tables did not.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl RunStore for SqliteStore {
    fn record_task(&self, record: &TaskRecord) -> PersistenceResult<()> {
        let (status, error_kind, error_message) = status_columns(&record.status);

        self.with_connection("record_task", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO task_records (run_id, task_id, run_name, tag, task_name, tier, status,
                          error_kind, error_message, steps, finished_at_unix)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT (run_id, task_id) DO UPDATE SET
    status = excluded.status,
    error_kind = excluded.error_kind,
    error_message = excluded.error_message,
    steps = excluded.steps,
    finished_at_unix = excluded.finished_at_unix
",
                params![
                    u64_to_i64(record.run_id.0)?,
                    u64_to_i64(record.task_id.0)?,
                    record.run_name,
                    record.tag,
                    record.task_name,
                    record.tier.as_str(),
                    status,
                    error_kind,
                    error_message,
                    u64_to_i64(record.steps)?,
                    to_unix_seconds(record.finished_at)?,
                ],
            )?;
            Ok(())
        })
    }

    fn list_recent_task_records(&self, limit: usize) -> PersistenceResult<Vec<TaskRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_recent_task_records", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "
SELECT {TASK_RECORD_COLUMNS}
FROM task_records
ORDER BY finished_at_unix DESC, run_id DESC, task_id ASC
LIMIT ?1
"
            ))?;
            let rows = statement.query_map(params![usize_to_i64(limit)?], read_task_record)?;
            rows.collect()
        })
    }

    fn list_run(&self, run_id: u64) -> PersistenceResult<Vec<TaskRecord>> {
        self.with_connection("list_run", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "
SELECT {TASK_RECORD_COLUMNS}
FROM task_records
WHERE run_id = ?1
ORDER BY task_id ASC
"
            ))?;
            let rows = statement.query_map(params![u64_to_i64(run_id)?], read_task_record)?;
            rows.collect()
        })
    }

    fn next_run_id(&self) -> PersistenceResult<u64> {
        self.with_connection("next_run_id", |connection| {
            ensure_schema_ready(connection)?;
            let max_id: Option<i64> =
                connection.query_row("SELECT MAX(run_id) FROM task_records", [], |row| {
                    row.get(0)
                })?;
            match max_id {
                Some(id) => Ok(i64_to_u64(id)?.saturating_add(1)),
                None => Ok(0),
            }
        })
    }

    fn prune_records(&self, max_age_secs: i64) -> PersistenceResult<usize> {
        self.with_connection("prune_records", |connection| {
            ensure_schema_ready(connection)?;
            let cutoff = to_unix_seconds(SystemTime::now())? - max_age_secs;
            let deleted = connection.execute(
                "DELETE FROM task_records WHERE finished_at_unix < ?1",
                params![cutoff],
            )?;
            Ok(deleted)
        })
    }
}

fn read_task_record(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let run_id: i64 = row.get(0)?;
    let task_id: i64 = row.get(1)?;
    let tier_raw: String = row.get(5)?;
    let status_raw: String = row.get(6)?;
    let error_kind_raw: Option<String> = row.get(7)?;
    let error_message: Option<String> = row.get(8)?;
    let steps: i64 = row.get(9)?;
    let finished_at_unix: i64 = row.get(10)?;

    Ok(TaskRecord {
        run_id: RunId(i64_to_u64(run_id)?),
        task_id: TaskId(i64_to_u64(task_id)?),
        run_name: row.get(2)?,
        tag: row.get(3)?,
        task_name: row.get(4)?,
        tier: parse_tier(&tier_raw)?,
        status: parse_status(&status_raw, error_kind_raw.as_deref(), error_message)?,
        steps: i64_to_u64(steps)?,
        finished_at: from_unix_seconds(finished_at_unix)?,
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before run history operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration version '{version}' is missing")))
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn status_columns(status: &TerminalStatus) -> (&'static str, Option<&'static str>, Option<&str>) {
    match status {
        TerminalStatus::Ok => ("completed", None, None),
        TerminalStatus::Error { kind, message } => {
            ("failed", Some(kind.as_str()), Some(message.as_str()))
        }
        TerminalStatus::Cancelled => ("cancelled", None, None),
    }
}

fn parse_status(
    raw: &str,
    error_kind: Option<&str>,
    error_message: Option<String>,
) -> rusqlite::Result<TerminalStatus> {
    match raw {
        "completed" => Ok(TerminalStatus::Ok),
        "cancelled" => Ok(TerminalStatus::Cancelled),
        "failed" => {
            let kind = error_kind
                .and_then(|kind| kind.parse::<CoreErrorKind>().ok())
                .ok_or_else(|| {
                    storage_error_sqlite(&format!(
                        "failed task record has unknown error kind '{error_kind:?}'"
                    ))
                })?;
            Ok(TerminalStatus::Error {
                kind,
                message: error_message.unwrap_or_default(),
            })
        }
        _ => Err(storage_error_sqlite(&format!(
            "unknown task status '{raw}' in sqlite record"
        ))),
    }
}

fn parse_tier(raw: &str) -> rusqlite::Result<Tier> {
    raw.parse::<Tier>()
        .map_err(|_| storage_error_sqlite(&format!("unknown tier '{raw}' in sqlite record")))
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("negative unix timestamps are not supported"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn u64_to_i64(value: u64) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn usize_to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative id in sqlite record"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
