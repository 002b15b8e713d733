//! Task and match commands.
//!
//! `task create` validates the request against the configured engine
//! catalog. `task edit` accepts a JSON body in the read shape and only
//! succeeds when it repeats the stored values. `task progress` is the job
//! runner's path for moving a task through its lifecycle.

use anyhow::{bail, Context, Result};
use std::path::Path;

use collab_core::models::{NewMatch, RecordId};
use collab_core::records;
use collab_core::store::Store;
use collab_core::task::{apply_progress, create_task, edit_task, TaskEdit, TaskProgress, TaskRequest};
use collab_core::views::MatchView;

use crate::config::Config;
use crate::db;
use crate::output::print_json;

pub async fn run_task_create(config: &Config, owner: &str, request: TaskRequest) -> Result<()> {
    let catalog = config.catalog();
    let store = db::open_store(config).await?;
    let task = create_task(&store, &catalog, owner, &request).await?;
    print_json(&task)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_task_show(config: &Config, id: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    let Some(task) = store.get_task(id).await? else {
        bail!("task not found: {}", id);
    };
    print_json(&task)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_task_edit(config: &Config, id: RecordId, body: &str) -> Result<()> {
    let edit: TaskEdit =
        serde_json::from_str(body).with_context(|| "Failed to parse task edit JSON")?;
    let store = db::open_store(config).await?;
    let task = edit_task(&store, id, &edit).await?;
    print_json(&task)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_task_progress(config: &Config, id: RecordId, update: TaskProgress) -> Result<()> {
    let store = db::open_store(config).await?;
    let task = apply_progress(&store, id, &update).await?;
    print_json(&task)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_match_record(config: &Config, task: RecordId, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read match file: {}", path.display()))?;
    let matches: Vec<NewMatch> =
        serde_json::from_str(&content).with_context(|| "Failed to parse match JSON")?;

    let store = db::open_store(config).await?;
    let rows = records::record_matches(&store, task, &matches).await?;
    print_json(&rows.iter().map(MatchView::from).collect::<Vec<_>>())?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_match_list(config: &Config, task: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    let rows = store.list_matches(task).await?;
    print_json(&rows.iter().map(MatchView::from).collect::<Vec<_>>())?;
    store.pool().close().await;
    Ok(())
}
