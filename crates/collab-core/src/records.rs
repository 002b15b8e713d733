//! Creation and edit paths for projects, files, file versions, matches and
//! dependencies.
//!
//! Each operation checks its foreign keys before writing, so a missing
//! reference surfaces as `NotFound` naming the reference rather than as a
//! backend constraint failure.

use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    Dependency, File, FileVersion, Match, NewFile, NewFileVersion, NewMatch, NewProject,
    Project, ProjectEdit, RecordId,
};
use crate::store::Store;

pub async fn create_project(store: &dyn Store, owner: &str, new: &NewProject) -> Result<Project> {
    if new.name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    let project = store.insert_project(owner, new).await?;
    info!(project_id = project.id, owner, "project created");
    Ok(project)
}

/// Applies the editable subset of a project. Owner and `created` stay fixed.
pub async fn edit_project(store: &dyn Store, id: RecordId, edit: &ProjectEdit) -> Result<Project> {
    if matches!(&edit.name, Some(name) if name.trim().is_empty()) {
        return Err(Error::validation("name", "must not be empty"));
    }
    store.update_project(id, edit).await
}

pub async fn create_file(store: &dyn Store, owner: &str, new: &NewFile) -> Result<File> {
    if new.name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if new.hash.is_empty() {
        return Err(Error::validation("hash", "must not be empty"));
    }
    store
        .get_project(new.project)
        .await?
        .ok_or_else(|| Error::not_found("project", new.project))?;
    let file = store.insert_file(owner, new).await?;
    info!(file_id = file.id, project_id = file.project, "file created");
    Ok(file)
}

pub async fn create_file_version(store: &dyn Store, new: &NewFileVersion) -> Result<FileVersion> {
    if new.complete && new.hash.is_empty() {
        return Err(Error::validation("hash", "must not be empty"));
    }
    store
        .get_file(new.file)
        .await?
        .ok_or_else(|| Error::not_found("file", new.file))?;
    store.insert_file_version(new).await
}

/// Marks a version complete with its final hash.
///
/// Completing an already-complete version with the same hash is a no-op; a
/// different hash is rejected because a complete snapshot never changes.
pub async fn complete_file_version(
    store: &dyn Store,
    id: RecordId,
    hash: &str,
) -> Result<FileVersion> {
    if hash.is_empty() {
        return Err(Error::validation("hash", "must not be empty"));
    }
    let current = store
        .get_file_version(id)
        .await?
        .ok_or_else(|| Error::not_found("file_version", id))?;
    if current.complete {
        if current.hash == hash {
            return Ok(current);
        }
        return Err(Error::validation(
            "hash",
            format!("file_version {} is already complete", id),
        ));
    }
    store.complete_file_version(id, hash).await
}

/// Adds a `dependent -> dependency` edge between two files.
///
/// Cycles, self-edges included, are the caller's concern.
pub async fn add_dependency(
    store: &dyn Store,
    dependent: RecordId,
    dependency: RecordId,
) -> Result<Dependency> {
    for id in [dependent, dependency] {
        store
            .get_file(id)
            .await?
            .ok_or_else(|| Error::not_found("file", id))?;
    }
    store.insert_dependency(dependent, dependency).await
}

/// Records a batch of matches produced by `task`.
pub async fn record_matches(
    store: &dyn Store,
    task: RecordId,
    matches: &[NewMatch],
) -> Result<Vec<Match>> {
    store
        .get_task(task)
        .await?
        .ok_or_else(|| Error::not_found("task", task))?;
    for m in matches {
        if !m.score.is_finite() {
            return Err(Error::validation("score", "must be a finite number"));
        }
        for id in [m.from_instance, m.to_instance] {
            store
                .get_instance(id)
                .await?
                .ok_or_else(|| Error::not_found("instance", id))?;
        }
    }
    if matches.is_empty() {
        return Ok(Vec::new());
    }
    let rows = store.insert_matches(task, matches).await?;
    info!(task_id = task, count = rows.len(), "matches recorded");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    async fn project_and_file(store: &InMemoryStore) -> (Project, File) {
        let project = create_project(
            store,
            "alice",
            &NewProject {
                name: "firmware".into(),
                description: "router images".into(),
                private: true,
            },
        )
        .await
        .unwrap();
        let file = create_file(
            store,
            "alice",
            &NewFile {
                project: project.id,
                name: "busybox".into(),
                hash: "abc".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (project, file)
    }

    #[tokio::test]
    async fn test_complete_version_requires_hash() {
        let store = InMemoryStore::new();
        let (_, file) = project_and_file(&store).await;

        let err = create_file_version(
            &store,
            &NewFileVersion {
                file: file.id,
                hash: String::new(),
                complete: true,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("hash"));
        assert!(store.list_file_versions(file.id).await.unwrap().is_empty());

        let pending = create_file_version(
            &store,
            &NewFileVersion {
                file: file.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!pending.complete);
        assert!(pending.hash.is_empty());
    }

    #[tokio::test]
    async fn test_file_requires_existing_project() {
        let store = InMemoryStore::new();
        let err = create_file(
            &store,
            "alice",
            &NewFile {
                project: 99,
                name: "x".into(),
                hash: "h".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "project not found: 99");
    }

    #[tokio::test]
    async fn test_edit_project_keeps_owner() {
        let store = InMemoryStore::new();
        let (project, _) = project_and_file(&store).await;
        let edited = edit_project(
            &store,
            project.id,
            &ProjectEdit {
                name: Some("renamed".into()),
                private: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(edited.name, "renamed");
        assert!(!edited.private);
        assert_eq!(edited.owner, "alice");
        assert_eq!(edited.created, project.created);
        assert_eq!(edited.description, "router images");
    }

    #[tokio::test]
    async fn test_version_history_is_ordered() {
        let store = InMemoryStore::new();
        let (_, file) = project_and_file(&store).await;
        for hash in ["v1", "v2", "v3"] {
            create_file_version(
                &store,
                &NewFileVersion {
                    file: file.id,
                    hash: hash.into(),
                    complete: false,
                },
            )
            .await
            .unwrap();
        }
        let hashes: Vec<String> = store
            .list_file_versions(file.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.hash)
            .collect();
        assert_eq!(hashes, ["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn test_complete_version_is_frozen() {
        let store = InMemoryStore::new();
        let (_, file) = project_and_file(&store).await;
        let v = create_file_version(
            &store,
            &NewFileVersion {
                file: file.id,
                hash: String::new(),
                complete: false,
            },
        )
        .await
        .unwrap();

        let done = complete_file_version(&store, v.id, "final").await.unwrap();
        assert!(done.complete);
        assert_eq!(done.hash, "final");

        complete_file_version(&store, v.id, "final").await.unwrap();
        let err = complete_file_version(&store, v.id, "other")
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("hash"));
    }

    #[tokio::test]
    async fn test_dependency_allows_self_edge_but_not_missing_file() {
        let store = InMemoryStore::new();
        let (_, file) = project_and_file(&store).await;
        let dep = add_dependency(&store, file.id, file.id).await.unwrap();
        assert_eq!(dep.dependent, dep.dependency);

        let err = add_dependency(&store, file.id, 42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_record_matches_requires_task() {
        let store = InMemoryStore::new();
        let err = record_matches(&store, 5, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "task not found: 5");
    }
}
