#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_run_history",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS task_records (
    run_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    run_name TEXT NOT NULL,
    tag TEXT NOT NULL,
    task_name TEXT NOT NULL,
    tier TEXT NOT NULL,
    status TEXT NOT NULL,
    error_kind TEXT,
    error_message TEXT,
    steps INTEGER NOT NULL DEFAULT 0,
    finished_at_unix INTEGER NOT NULL,
    PRIMARY KEY (run_id, task_id)
);

CREATE INDEX IF NOT EXISTS idx_task_records_finished
    ON task_records (finished_at_unix DESC, run_id DESC);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_task_records_finished;
DROP TABLE IF EXISTS task_records;
"#,
};

const MIGRATIONS: [SqliteMigration; 1] = [MIGRATION_0001];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
