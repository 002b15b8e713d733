//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`crate::migrate`]. The instance aggregate is written inside one
//! transaction with multi-row inserts for the vector and annotation
//! batches. Task state writes are a single conditional `UPDATE` that only
//! matches while the row still holds the state the caller read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use collab_core::error::{Error, Result};
use collab_core::models::{
    Annotation, Dependency, File, FileVersion, Instance, InstanceType, Match, NewAnnotation,
    NewFile, NewFileVersion, NewInstance, NewMatch, NewProject, NewTask, NewVector, Payload,
    Project, ProjectEdit, RecordId, Task, TaskState, Vector,
};
use collab_core::store::Store;

/// Rows per multi-row `INSERT`, well below SQLite's bind-parameter limit.
const BATCH_ROWS: usize = 500;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db(err: sqlx::Error) -> Error {
    Error::storage_with_source("database query failed", err)
}

fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::storage(format!("timestamp out of range: {}", ms)))
}

fn unsigned(v: i64) -> u64 {
    v.max(0) as u64
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id").map_err(db)?,
        created: from_ms(row.try_get("created").map_err(db)?)?,
        owner: row.try_get("owner").map_err(db)?,
        name: row.try_get("name").map_err(db)?,
        description: row.try_get("description").map_err(db)?,
        private: row.try_get("private").map_err(db)?,
    })
}

fn file_from_row(row: &SqliteRow) -> Result<File> {
    Ok(File {
        id: row.try_get("id").map_err(db)?,
        created: from_ms(row.try_get("created").map_err(db)?)?,
        owner: row.try_get("owner").map_err(db)?,
        project: row.try_get("project_id").map_err(db)?,
        name: row.try_get("name").map_err(db)?,
        description: row.try_get("description").map_err(db)?,
        hash: row.try_get("hash").map_err(db)?,
        locator: row.try_get("locator").map_err(db)?,
    })
}

fn file_version_from_row(row: &SqliteRow) -> Result<FileVersion> {
    Ok(FileVersion {
        id: row.try_get("id").map_err(db)?,
        created: from_ms(row.try_get("created").map_err(db)?)?,
        file: row.try_get("file_id").map_err(db)?,
        hash: row.try_get("hash").map_err(db)?,
        complete: row.try_get("complete").map_err(db)?,
    })
}

fn instance_from_row(row: &SqliteRow) -> Result<Instance> {
    let kind: String = row.try_get("type").map_err(db)?;
    Ok(Instance {
        id: row.try_get("id").map_err(db)?,
        file_version: row.try_get("file_version_id").map_err(db)?,
        owner: row.try_get("owner").map_err(db)?,
        kind: kind.parse()?,
        offset: unsigned(row.try_get("offset").map_err(db)?),
        size: unsigned(row.try_get("size").map_err(db)?),
        count: unsigned(row.try_get("count").map_err(db)?),
    })
}

fn vector_from_row(row: &SqliteRow) -> Result<Vector> {
    let type_version: i64 = row.try_get("type_version").map_err(db)?;
    Ok(Vector {
        id: row.try_get("id").map_err(db)?,
        file_version: row.try_get("file_version_id").map_err(db)?,
        instance: row.try_get("instance_id").map_err(db)?,
        kind: row.try_get("type").map_err(db)?,
        type_version: u32::try_from(type_version)
            .map_err(|_| Error::storage(format!("type_version out of range: {}", type_version)))?,
        data: Payload::new(row.try_get::<String, _>("data").map_err(db)?),
    })
}

fn annotation_from_row(row: &SqliteRow) -> Result<Annotation> {
    let uuid: String = row.try_get("uuid").map_err(db)?;
    Ok(Annotation {
        id: row.try_get("id").map_err(db)?,
        uuid: Uuid::parse_str(&uuid)
            .map_err(|e| Error::storage_with_source(format!("bad annotation uuid '{}'", uuid), e))?,
        instance: row.try_get("instance_id").map_err(db)?,
        kind: row.try_get("type").map_err(db)?,
        data: Payload::new(row.try_get::<String, _>("data").map_err(db)?),
    })
}

fn match_from_row(row: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: row.try_get("id").map_err(db)?,
        from_instance: row.try_get("from_instance_id").map_err(db)?,
        to_instance: row.try_get("to_instance_id").map_err(db)?,
        task: row.try_get("task_id").map_err(db)?,
        kind: row.try_get("type").map_err(db)?,
        score: row.try_get("score").map_err(db)?,
    })
}

fn dependency_from_row(row: &SqliteRow) -> Result<Dependency> {
    Ok(Dependency {
        id: row.try_get("id").map_err(db)?,
        dependent: row.try_get("dependent_id").map_err(db)?,
        dependency: row.try_get("dependency_id").map_err(db)?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let status: String = row.try_get("status").map_err(db)?;
    let matchers: String = row.try_get("matchers").map_err(db)?;
    let finished: Option<i64> = row.try_get("finished").map_err(db)?;
    let source_start: Option<i64> = row.try_get("source_start").map_err(db)?;
    let source_end: Option<i64> = row.try_get("source_end").map_err(db)?;
    let progress_max: Option<i64> = row.try_get("progress_max").map_err(db)?;

    Ok(Task {
        id: row.try_get("id").map_err(db)?,
        task_id: row.try_get("task_id").map_err(db)?,
        created: from_ms(row.try_get("created").map_err(db)?)?,
        owner: row.try_get("owner").map_err(db)?,
        target_project: row.try_get("target_project_id").map_err(db)?,
        target_file: row.try_get("target_file_id").map_err(db)?,
        source_file: row.try_get("source_file_id").map_err(db)?,
        source_file_version: row.try_get("source_file_version_id").map_err(db)?,
        source_start: source_start.map(unsigned),
        source_end: source_end.map(unsigned),
        matchers: serde_json::from_str(&matchers)?,
        strategy: row.try_get("strategy").map_err(db)?,
        state: TaskState {
            status: status.parse()?,
            progress: unsigned(row.try_get("progress").map_err(db)?),
            progress_max: progress_max.map(unsigned),
            local_count: unsigned(row.try_get("local_count").map_err(db)?),
            remote_count: unsigned(row.try_get("remote_count").map_err(db)?),
            match_count: unsigned(row.try_get("match_count").map_err(db)?),
            finished: finished.map(from_ms).transpose()?,
        },
    })
}

impl SqliteStore {
    async fn fetch_one_opt<T: Send>(
        &self,
        sql: &str,
        id: RecordId,
        map: fn(&SqliteRow) -> Result<T>,
    ) -> Result<Option<T>> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(map).transpose()
    }

    async fn fetch_all_by<T: Send>(
        &self,
        sql: &str,
        id: RecordId,
        map: fn(&SqliteRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.iter().map(map).collect()
    }

    async fn write_aggregate(
        &self,
        instance: &NewInstance,
        vectors: &[NewVector],
        annotations: &[NewAnnotation],
    ) -> std::result::Result<RecordId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO instances (file_version_id, owner, type, "offset", size, count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(instance.file_version)
        .bind(&instance.owner)
        .bind(instance.kind.as_str())
        .bind(instance.offset as i64)
        .bind(instance.size as i64)
        .bind(instance.count as i64)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for chunk in vectors.chunks(BATCH_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO vectors (file_version_id, instance_id, type, type_version, data) ",
            );
            qb.push_values(chunk, |mut b, v| {
                b.push_bind(instance.file_version)
                    .push_bind(id)
                    .push_bind(v.kind.clone())
                    .push_bind(i64::from(v.type_version))
                    .push_bind(v.data.as_str().to_string());
            });
            qb.build().execute(&mut *tx).await?;
        }

        for chunk in annotations.chunks(BATCH_ROWS) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO annotations (uuid, instance_id, type, data) ");
            qb.push_values(chunk, |mut b, a| {
                b.push_bind(a.uuid.to_string())
                    .push_bind(id)
                    .push_bind(a.kind.clone())
                    .push_bind(a.data.as_str().to_string());
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_project(&self, owner: &str, project: &NewProject) -> Result<Project> {
        let id = sqlx::query(
            "INSERT INTO projects (created, owner, name, description, private) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(to_ms(Utc::now()))
        .bind(owner)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.private)
        .execute(&self.pool)
        .await
        .map_err(db)?
        .last_insert_rowid();

        self.get_project(id)
            .await?
            .ok_or_else(|| Error::not_found("project", id))
    }

    async fn get_project(&self, id: RecordId) -> Result<Option<Project>> {
        self.fetch_one_opt("SELECT * FROM projects WHERE id = ?", id, project_from_row)
            .await
    }

    async fn update_project(&self, id: RecordId, edit: &ProjectEdit) -> Result<Project> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                private = COALESCE(?, private)
            WHERE id = ?
            "#,
        )
        .bind(&edit.name)
        .bind(&edit.description)
        .bind(edit.private)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("project", id));
        }
        self.get_project(id)
            .await?
            .ok_or_else(|| Error::not_found("project", id))
    }

    async fn insert_file(&self, owner: &str, file: &NewFile) -> Result<File> {
        let id = sqlx::query(
            r#"
            INSERT INTO files (created, owner, project_id, name, description, hash, locator)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_ms(Utc::now()))
        .bind(owner)
        .bind(file.project)
        .bind(&file.name)
        .bind(&file.description)
        .bind(&file.hash)
        .bind(&file.locator)
        .execute(&self.pool)
        .await
        .map_err(db)?
        .last_insert_rowid();

        self.get_file(id)
            .await?
            .ok_or_else(|| Error::not_found("file", id))
    }

    async fn get_file(&self, id: RecordId) -> Result<Option<File>> {
        self.fetch_one_opt("SELECT * FROM files WHERE id = ?", id, file_from_row)
            .await
    }

    async fn list_files(&self, project: RecordId) -> Result<Vec<File>> {
        self.fetch_all_by(
            "SELECT * FROM files WHERE project_id = ? ORDER BY id",
            project,
            file_from_row,
        )
        .await
    }

    async fn insert_file_version(&self, version: &NewFileVersion) -> Result<FileVersion> {
        let id = sqlx::query(
            "INSERT INTO file_versions (created, file_id, hash, complete) VALUES (?, ?, ?, ?)",
        )
        .bind(to_ms(Utc::now()))
        .bind(version.file)
        .bind(&version.hash)
        .bind(version.complete)
        .execute(&self.pool)
        .await
        .map_err(db)?
        .last_insert_rowid();

        self.get_file_version(id)
            .await?
            .ok_or_else(|| Error::not_found("file_version", id))
    }

    async fn get_file_version(&self, id: RecordId) -> Result<Option<FileVersion>> {
        self.fetch_one_opt(
            "SELECT * FROM file_versions WHERE id = ?",
            id,
            file_version_from_row,
        )
        .await
    }

    async fn list_file_versions(&self, file: RecordId) -> Result<Vec<FileVersion>> {
        self.fetch_all_by(
            "SELECT * FROM file_versions WHERE file_id = ? ORDER BY id",
            file,
            file_version_from_row,
        )
        .await
    }

    async fn complete_file_version(&self, id: RecordId, hash: &str) -> Result<FileVersion> {
        let result = sqlx::query("UPDATE file_versions SET hash = ?, complete = 1 WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("file_version", id));
        }
        self.get_file_version(id)
            .await?
            .ok_or_else(|| Error::not_found("file_version", id))
    }

    async fn insert_instance_aggregate(
        &self,
        instance: &NewInstance,
        vectors: &[NewVector],
        annotations: &[NewAnnotation],
    ) -> Result<Instance> {
        let id = self
            .write_aggregate(instance, vectors, annotations)
            .await
            .map_err(|e| Error::aggregate_write("transaction rolled back", Some(Box::new(e))))?;
        debug!(
            instance_id = id,
            vectors = vectors.len(),
            annotations = annotations.len(),
            "aggregate committed"
        );

        Ok(Instance {
            id,
            file_version: instance.file_version,
            owner: instance.owner.clone(),
            kind: instance.kind,
            offset: instance.offset,
            size: instance.size,
            count: instance.count,
        })
    }

    async fn get_instance(&self, id: RecordId) -> Result<Option<Instance>> {
        self.fetch_one_opt("SELECT * FROM instances WHERE id = ?", id, instance_from_row)
            .await
    }

    async fn list_instances(
        &self,
        file_version: RecordId,
        kind: Option<InstanceType>,
    ) -> Result<Vec<Instance>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM instances
            WHERE file_version_id = ? AND (? IS NULL OR type = ?)
            ORDER BY id
            "#,
        )
        .bind(file_version)
        .bind(kind.map(|k| k.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(instance_from_row).collect()
    }

    async fn list_vectors(&self, instance: RecordId) -> Result<Vec<Vector>> {
        self.fetch_all_by(
            "SELECT * FROM vectors WHERE instance_id = ? ORDER BY id",
            instance,
            vector_from_row,
        )
        .await
    }

    async fn list_vectors_by_file_version(
        &self,
        file_version: RecordId,
        kind: Option<&str>,
    ) -> Result<Vec<Vector>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM vectors
            WHERE file_version_id = ? AND (? IS NULL OR type = ?)
            ORDER BY id
            "#,
        )
        .bind(file_version)
        .bind(kind)
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(vector_from_row).collect()
    }

    async fn list_annotations(
        &self,
        instance: RecordId,
        kind: Option<&str>,
    ) -> Result<Vec<Annotation>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM annotations
            WHERE instance_id = ? AND (? IS NULL OR type = ?)
            ORDER BY id
            "#,
        )
        .bind(instance)
        .bind(kind)
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(annotation_from_row).collect()
    }

    async fn count_annotations(&self, instance: RecordId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE instance_id = ?")
            .bind(instance)
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;
        Ok(unsigned(count))
    }

    async fn get_annotation_by_uuid(&self, uuid: Uuid) -> Result<Option<Annotation>> {
        let row = sqlx::query("SELECT * FROM annotations WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(annotation_from_row).transpose()
    }

    async fn insert_matches(&self, task: RecordId, matches: &[NewMatch]) -> Result<Vec<Match>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut rows = Vec::with_capacity(matches.len());
        for chunk in matches.chunks(BATCH_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO matches (from_instance_id, to_instance_id, task_id, type, score) ",
            );
            qb.push_values(chunk, |mut b, m| {
                b.push_bind(m.from_instance)
                    .push_bind(m.to_instance)
                    .push_bind(task)
                    .push_bind(m.kind.clone())
                    .push_bind(m.score);
            });
            qb.push(" RETURNING *");
            for row in qb.build().fetch_all(&mut *tx).await.map_err(db)? {
                rows.push(match_from_row(&row)?);
            }
        }
        tx.commit().await.map_err(db)?;
        rows.sort_by_key(|m| m.id);
        Ok(rows)
    }

    async fn list_matches(&self, task: RecordId) -> Result<Vec<Match>> {
        self.fetch_all_by(
            "SELECT * FROM matches WHERE task_id = ? ORDER BY id",
            task,
            match_from_row,
        )
        .await
    }

    async fn insert_dependency(
        &self,
        dependent: RecordId,
        dependency: RecordId,
    ) -> Result<Dependency> {
        let id = sqlx::query("INSERT INTO dependencies (dependent_id, dependency_id) VALUES (?, ?)")
            .bind(dependent)
            .bind(dependency)
            .execute(&self.pool)
            .await
            .map_err(db)?
            .last_insert_rowid();
        Ok(Dependency {
            id,
            dependent,
            dependency,
        })
    }

    async fn list_dependencies(&self, dependent: RecordId) -> Result<Vec<Dependency>> {
        self.fetch_all_by(
            "SELECT * FROM dependencies WHERE dependent_id = ? ORDER BY id",
            dependent,
            dependency_from_row,
        )
        .await
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let s = &task.state;
        let id = sqlx::query(
            r#"
            INSERT INTO tasks (task_id, created, finished, owner, status,
                               target_project_id, target_file_id, source_file_id,
                               source_file_version_id, source_start, source_end,
                               matchers, strategy, progress, progress_max,
                               local_count, remote_count, match_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(to_ms(task.created))
        .bind(s.finished.map(to_ms))
        .bind(&task.owner)
        .bind(s.status.as_str())
        .bind(task.target_project)
        .bind(task.target_file)
        .bind(task.source_file)
        .bind(task.source_file_version)
        .bind(task.source_start.map(|v| v as i64))
        .bind(task.source_end.map(|v| v as i64))
        .bind(serde_json::to_string(&task.matchers)?)
        .bind(&task.strategy)
        .bind(s.progress as i64)
        .bind(s.progress_max.map(|v| v as i64))
        .bind(s.local_count as i64)
        .bind(s.remote_count as i64)
        .bind(s.match_count as i64)
        .execute(&self.pool)
        .await
        .map_err(db)?
        .last_insert_rowid();

        self.get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    async fn get_task(&self, id: RecordId) -> Result<Option<Task>> {
        self.fetch_one_opt("SELECT * FROM tasks WHERE id = ?", id, task_from_row)
            .await
    }

    async fn update_task_state(
        &self,
        id: RecordId,
        expected: &TaskState,
        next: &TaskState,
    ) -> Result<Task> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?, progress = ?, progress_max = ?,
                local_count = ?, remote_count = ?, match_count = ?, finished = ?
            WHERE id = ?
              AND status = ? AND progress = ? AND progress_max IS ?
              AND local_count = ? AND remote_count = ? AND match_count = ?
              AND finished IS ?
            "#,
        )
        .bind(next.status.as_str())
        .bind(next.progress as i64)
        .bind(next.progress_max.map(|v| v as i64))
        .bind(next.local_count as i64)
        .bind(next.remote_count as i64)
        .bind(next.match_count as i64)
        .bind(next.finished.map(to_ms))
        .bind(id)
        .bind(expected.status.as_str())
        .bind(expected.progress as i64)
        .bind(expected.progress_max.map(|v| v as i64))
        .bind(expected.local_count as i64)
        .bind(expected.remote_count as i64)
        .bind(expected.match_count as i64)
        .bind(expected.finished.map(to_ms))
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return match self.get_task(id).await? {
                None => Err(Error::not_found("task", id)),
                Some(_) => Err(Error::Conflict {
                    message: format!("task {} changed since it was read", id),
                }),
            };
        }
        self.get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }
}
