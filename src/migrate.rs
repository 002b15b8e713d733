//! Database schema migrations.
//!
//! Every statement is `IF NOT EXISTS`, so running migrations against an
//! existing database is a no-op. Timestamps are Unix milliseconds; task
//! matcher lists are stored as a JSON array.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created INTEGER NOT NULL,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        private INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created INTEGER NOT NULL,
        owner TEXT NOT NULL,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        hash TEXT NOT NULL,
        locator TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created INTEGER NOT NULL,
        file_id INTEGER NOT NULL REFERENCES files(id),
        hash TEXT NOT NULL,
        complete INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_version_id INTEGER NOT NULL REFERENCES file_versions(id),
        owner TEXT NOT NULL,
        type TEXT NOT NULL,
        "offset" INTEGER NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vectors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_version_id INTEGER NOT NULL REFERENCES file_versions(id),
        instance_id INTEGER NOT NULL REFERENCES instances(id),
        type TEXT NOT NULL,
        type_version INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annotations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL UNIQUE,
        instance_id INTEGER NOT NULL REFERENCES instances(id),
        type TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL UNIQUE,
        created INTEGER NOT NULL,
        finished INTEGER,
        owner TEXT NOT NULL,
        status TEXT NOT NULL,
        target_project_id INTEGER REFERENCES projects(id),
        target_file_id INTEGER REFERENCES files(id),
        source_file_id INTEGER NOT NULL REFERENCES files(id),
        source_file_version_id INTEGER NOT NULL REFERENCES file_versions(id),
        source_start INTEGER,
        source_end INTEGER,
        matchers TEXT NOT NULL DEFAULT '[]',
        strategy TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        progress_max INTEGER,
        local_count INTEGER NOT NULL DEFAULT 0,
        remote_count INTEGER NOT NULL DEFAULT 0,
        match_count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_instance_id INTEGER NOT NULL REFERENCES instances(id),
        to_instance_id INTEGER NOT NULL REFERENCES instances(id),
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        type TEXT NOT NULL,
        score REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dependencies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dependent_id INTEGER NOT NULL REFERENCES files(id),
        dependency_id INTEGER NOT NULL REFERENCES files(id)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_file_versions_file ON file_versions(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_instances_file_version ON instances(file_version_id, type)",
    "CREATE INDEX IF NOT EXISTS idx_vectors_instance ON vectors(instance_id)",
    "CREATE INDEX IF NOT EXISTS idx_vectors_file_version ON vectors(file_version_id, type)",
    "CREATE INDEX IF NOT EXISTS idx_annotations_instance ON annotations(instance_id, type)",
    "CREATE INDEX IF NOT EXISTS idx_matches_task ON matches(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_dependent ON dependencies(dependent_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
];

/// Applies the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for stmt in TABLES.iter().chain(INDEXES) {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Opens the configured database, applies the schema, and closes it.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    info!(path = %config.db.path.display(), "schema up to date");
    pool.close().await;
    Ok(())
}
