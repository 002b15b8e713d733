//! Task lifecycle: creation, user edits, and runner progress updates.
//!
//! A task has two field groups. The defining fields (targets, source,
//! range, matchers, strategy) are fixed by [`create_task`] and never change
//! again. The mutable group ([`TaskState`]) belongs to the job runner and
//! changes only through [`apply_progress`], which enforces the status
//! machine `pending -> running -> {completed, failed}` and refuses any
//! write once the task is terminal.
//!
//! The user-facing edit shape ([`TaskEdit`]) exposes the same fields as the
//! read shape but every one of them is read-only there: a request that
//! repeats the stored values is accepted, one that differs is rejected
//! naming the field.

use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Catalog, NewTask, RecordId, Task, TaskState, TaskStatus};
use crate::store::Store;

/// Attempts made by [`apply_progress`] before giving up on write conflicts.
const MAX_STATE_WRITE_ATTEMPTS: usize = 3;

/// Requester-supplied fields of a new task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub target_project: Option<RecordId>,
    #[serde(default)]
    pub target_file: Option<RecordId>,
    pub source_file_version: RecordId,
    #[serde(default)]
    pub source_start: Option<u64>,
    #[serde(default)]
    pub source_end: Option<u64>,
    pub matchers: Vec<String>,
    pub strategy: String,
}

/// The user-facing edit shape. Every field is read-only after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskEdit {
    #[serde(default, deserialize_with = "explicit_null")]
    pub target_project: Option<Option<RecordId>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub target_file: Option<Option<RecordId>>,
    pub source_file: Option<RecordId>,
    pub source_file_version: Option<RecordId>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub source_start: Option<Option<u64>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub source_end: Option<Option<u64>>,
    pub matchers: Option<Vec<String>>,
    pub strategy: Option<String>,
    pub status: Option<TaskStatus>,
    pub progress: Option<u64>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub progress_max: Option<Option<u64>>,
    pub local_count: Option<u64>,
    pub remote_count: Option<u64>,
    pub match_count: Option<u64>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn explicit_null<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// A job-runner update of the mutable group. Absent fields keep their
/// stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskProgress {
    pub status: Option<TaskStatus>,
    pub progress: Option<u64>,
    pub progress_max: Option<u64>,
    pub local_count: Option<u64>,
    pub remote_count: Option<u64>,
    pub match_count: Option<u64>,
}

/// Counters and bounds are stored as signed 64-bit integers.
fn storable(field: &'static str, value: Option<u64>) -> Result<()> {
    match value {
        Some(v) if v > i64::MAX as u64 => {
            Err(Error::validation(field, "exceeds the storable range"))
        }
        _ => Ok(()),
    }
}

/// Matcher list with repeats removed, first occurrence kept.
fn distinct(matchers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(matchers.len());
    for m in matchers {
        if !out.contains(m) {
            out.push(m.clone());
        }
    }
    out
}

/// Validates `request` and persists a new pending task owned by `owner`.
///
/// `source_file` is derived from the source version; id, external task id,
/// creation time and the initial state are assigned here.
pub async fn create_task(
    store: &dyn Store,
    catalog: &Catalog,
    owner: &str,
    request: &TaskRequest,
) -> Result<Task> {
    if request.matchers.is_empty() {
        return Err(Error::validation("matchers", "at least one matcher is required"));
    }
    for m in &request.matchers {
        if catalog.matcher(m).is_none() {
            return Err(Error::validation("matchers", format!("unknown matcher '{}'", m)));
        }
    }
    if catalog.strategy(&request.strategy).is_none() {
        return Err(Error::validation(
            "strategy",
            format!("unknown strategy '{}'", request.strategy),
        ));
    }
    if let (Some(start), Some(end)) = (request.source_start, request.source_end) {
        if start > end {
            return Err(Error::validation(
                "source_end",
                format!("range end {} precedes start {}", end, start),
            ));
        }
    }
    storable("source_start", request.source_start)?;
    storable("source_end", request.source_end)?;

    let version = store
        .get_file_version(request.source_file_version)
        .await?
        .ok_or_else(|| Error::not_found("file_version", request.source_file_version))?;
    if let Some(project) = request.target_project {
        store
            .get_project(project)
            .await?
            .ok_or_else(|| Error::not_found("project", project))?;
    }
    if let Some(file) = request.target_file {
        store
            .get_file(file)
            .await?
            .ok_or_else(|| Error::not_found("file", file))?;
    }

    let matchers = distinct(&request.matchers);

    let task = store
        .insert_task(&NewTask {
            task_id: Uuid::new_v4().to_string(),
            created: Utc::now(),
            owner: owner.to_string(),
            target_project: request.target_project,
            target_file: request.target_file,
            source_file: version.file,
            source_file_version: version.id,
            source_start: request.source_start,
            source_end: request.source_end,
            matchers,
            strategy: request.strategy.clone(),
            state: TaskState::initial(),
        })
        .await?;
    info!(id = task.id, task_id = %task.task_id, owner, "task created");
    Ok(task)
}

/// Checks a user edit against the stored task and returns it unchanged.
///
/// Nothing is writable through this path; any field whose requested value
/// differs from the stored one is rejected.
pub async fn edit_task(store: &dyn Store, id: RecordId, edit: &TaskEdit) -> Result<Task> {
    let task = store
        .get_task(id)
        .await?
        .ok_or_else(|| Error::not_found("task", id))?;

    fn frozen<T: PartialEq>(field: &'static str, requested: &Option<T>, stored: &T) -> Result<()> {
        match requested {
            Some(value) if value != stored => {
                Err(Error::validation(field, "is read-only after creation"))
            }
            _ => Ok(()),
        }
    }

    frozen("target_project", &edit.target_project, &task.target_project)?;
    frozen("target_file", &edit.target_file, &task.target_file)?;
    frozen("source_file", &edit.source_file, &task.source_file)?;
    frozen(
        "source_file_version",
        &edit.source_file_version,
        &task.source_file_version,
    )?;
    frozen("source_start", &edit.source_start, &task.source_start)?;
    frozen("source_end", &edit.source_end, &task.source_end)?;
    frozen(
        "matchers",
        &edit.matchers.as_deref().map(distinct),
        &task.matchers,
    )?;
    frozen("strategy", &edit.strategy, &task.strategy)?;

    // The runner owns these; users cannot set them even to valid values.
    let s = &task.state;
    frozen("status", &edit.status, &s.status)?;
    frozen("progress", &edit.progress, &s.progress)?;
    frozen("progress_max", &edit.progress_max, &s.progress_max)?;
    frozen("local_count", &edit.local_count, &s.local_count)?;
    frozen("remote_count", &edit.remote_count, &s.remote_count)?;
    frozen("match_count", &edit.match_count, &s.match_count)?;

    Ok(task)
}

/// Computes the state that results from applying `update` to `current`.
pub fn next_state(current: &TaskState, update: &TaskProgress) -> Result<TaskState> {
    if current.status.is_terminal() {
        return Err(Error::validation(
            "status",
            format!("task is {} and can no longer change", current.status),
        ));
    }

    storable("progress", update.progress)?;
    storable("progress_max", update.progress_max)?;
    storable("local_count", update.local_count)?;
    storable("remote_count", update.remote_count)?;
    storable("match_count", update.match_count)?;

    let mut next = current.clone();
    if let Some(status) = update.status {
        if !current.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        next.status = status;
    }
    if let Some(progress) = update.progress {
        next.progress = progress;
    }
    if let Some(max) = update.progress_max {
        next.progress_max = Some(max);
    }
    if let Some(max) = next.progress_max {
        if next.progress > max {
            return Err(Error::validation(
                "progress",
                format!("{} exceeds progress_max {}", next.progress, max),
            ));
        }
    }
    if let Some(n) = update.local_count {
        next.local_count = n;
    }
    if let Some(n) = update.remote_count {
        next.remote_count = n;
    }
    if let Some(n) = update.match_count {
        next.match_count = n;
    }
    if next.status.is_terminal() {
        next.finished = Some(Utc::now());
    }
    Ok(next)
}

/// Applies a job-runner update to task `id`.
///
/// The write is a compare-and-swap on the state that was read, retried a
/// few times if another writer interleaves.
pub async fn apply_progress(store: &dyn Store, id: RecordId, update: &TaskProgress) -> Result<Task> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let task = store
            .get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))?;
        let next = next_state(&task.state, update)?;

        match store.update_task_state(id, &task.state, &next).await {
            Ok(updated) => {
                if updated.state.status != task.state.status {
                    info!(
                        id,
                        from = %task.state.status,
                        to = %updated.state.status,
                        "task status changed"
                    );
                }
                return Ok(updated);
            }
            Err(Error::Conflict { message }) if attempt < MAX_STATE_WRITE_ATTEMPTS => {
                warn!(id, attempt, %message, "task state write conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
