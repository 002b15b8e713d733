//! Project, file, file-version and dependency commands.
//!
//! Each `run_*` function opens the configured database, performs one core
//! operation through [`SqliteStore`](crate::sqlite_store::SqliteStore), and
//! prints the resulting projection as JSON.

use anyhow::{bail, Result};
use std::path::Path;

use collab_core::models::{NewFile, NewFileVersion, NewProject, ProjectEdit, RecordId};
use collab_core::records;
use collab_core::store::Store;
use collab_core::views::{project_view, DependencyView};

use crate::config::Config;
use crate::db;
use crate::hashing::resolve_hash;
use crate::output::print_json;

pub async fn run_project_create(config: &Config, owner: &str, new: NewProject) -> Result<()> {
    let store = db::open_store(config).await?;
    let project = records::create_project(&store, owner, &new).await?;
    print_json(&project_view(&store, &project).await?)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_project_show(config: &Config, id: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    let Some(project) = store.get_project(id).await? else {
        bail!("project not found: {}", id);
    };
    print_json(&project_view(&store, &project).await?)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_project_edit(config: &Config, id: RecordId, edit: ProjectEdit) -> Result<()> {
    let store = db::open_store(config).await?;
    let project = records::edit_project(&store, id, &edit).await?;
    print_json(&project_view(&store, &project).await?)?;
    store.pool().close().await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_file_create(
    config: &Config,
    owner: &str,
    project: RecordId,
    name: String,
    description: String,
    hash: Option<String>,
    path: Option<&Path>,
    locator: Option<String>,
) -> Result<()> {
    let hash = resolve_hash(hash, path)?;
    let locator = locator
        .or_else(|| path.map(|p| p.display().to_string()))
        .unwrap_or_default();

    let store = db::open_store(config).await?;
    let file = records::create_file(
        &store,
        owner,
        &NewFile {
            project,
            name,
            description,
            hash,
            locator,
        },
    )
    .await?;
    print_json(&file)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_file_show(config: &Config, id: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    let Some(file) = store.get_file(id).await? else {
        bail!("file not found: {}", id);
    };
    print_json(&file)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_file_list(config: &Config, project: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    print_json(&store.list_files(project).await?)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_version_create(
    config: &Config,
    file: RecordId,
    hash: Option<String>,
    path: Option<&Path>,
    complete: bool,
) -> Result<()> {
    // An incomplete snapshot may not have a hash yet.
    let hash = match (hash, path) {
        (None, None) if !complete => String::new(),
        (hash, path) => resolve_hash(hash, path)?,
    };
    let store = db::open_store(config).await?;
    let version =
        records::create_file_version(&store, &NewFileVersion { file, hash, complete }).await?;
    print_json(&version)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_version_complete(
    config: &Config,
    id: RecordId,
    hash: Option<String>,
    path: Option<&Path>,
) -> Result<()> {
    let hash = resolve_hash(hash, path)?;
    let store = db::open_store(config).await?;
    let version = records::complete_file_version(&store, id, &hash).await?;
    print_json(&version)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_version_list(config: &Config, file: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    print_json(&store.list_file_versions(file).await?)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_dependency_add(
    config: &Config,
    dependent: RecordId,
    dependency: RecordId,
) -> Result<()> {
    let store = db::open_store(config).await?;
    let edge = records::add_dependency(&store, dependent, dependency).await?;
    print_json(&DependencyView::from(&edge))?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_dependency_list(config: &Config, dependent: RecordId) -> Result<()> {
    let store = db::open_store(config).await?;
    let edges: Vec<DependencyView> = store
        .list_dependencies(dependent)
        .await?
        .iter()
        .map(DependencyView::from)
        .collect();
    print_json(&edges)?;
    store.pool().close().await;
    Ok(())
}
