//! In-memory [`Store`] implementation for tests and library callers.
//!
//! All tables live behind one `std::sync::RwLock`, so every trait method,
//! including the aggregate insert and the task compare-and-swap, is atomic
//! with respect to every other. Ids are assigned from per-table counters
//! starting at 1.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Annotation, Dependency, File, FileVersion, Instance, InstanceType, Match, NewAnnotation,
    NewFile, NewFileVersion, NewInstance, NewMatch, NewProject, NewTask, NewVector, Project,
    ProjectEdit, RecordId, Task, TaskState, Vector,
};

use super::Store;

#[derive(Default)]
struct Tables {
    next_id: BTreeMap<&'static str, RecordId>,
    projects: BTreeMap<RecordId, Project>,
    files: BTreeMap<RecordId, File>,
    file_versions: BTreeMap<RecordId, FileVersion>,
    instances: BTreeMap<RecordId, Instance>,
    vectors: BTreeMap<RecordId, Vector>,
    annotations: BTreeMap<RecordId, Annotation>,
    matches: BTreeMap<RecordId, Match>,
    dependencies: BTreeMap<RecordId, Dependency>,
    tasks: BTreeMap<RecordId, Task>,
}

impl Tables {
    fn allocate(&mut self, table: &'static str) -> RecordId {
        let next = self.next_id.entry(table).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }
}

/// In-memory store. Cheap to construct; one per test.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::storage("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::storage("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_project(&self, owner: &str, project: &NewProject) -> Result<Project> {
        let mut t = self.write()?;
        let id = t.allocate("projects");
        let row = Project {
            id,
            created: Utc::now(),
            owner: owner.to_string(),
            name: project.name.clone(),
            description: project.description.clone(),
            private: project.private,
        };
        t.projects.insert(id, row.clone());
        Ok(row)
    }

    async fn get_project(&self, id: RecordId) -> Result<Option<Project>> {
        Ok(self.read()?.projects.get(&id).cloned())
    }

    async fn update_project(&self, id: RecordId, edit: &ProjectEdit) -> Result<Project> {
        let mut t = self.write()?;
        let row = t
            .projects
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("project", id))?;
        if let Some(name) = &edit.name {
            row.name = name.clone();
        }
        if let Some(description) = &edit.description {
            row.description = description.clone();
        }
        if let Some(private) = edit.private {
            row.private = private;
        }
        Ok(row.clone())
    }

    async fn insert_file(&self, owner: &str, file: &NewFile) -> Result<File> {
        let mut t = self.write()?;
        if !t.projects.contains_key(&file.project) {
            return Err(Error::storage(format!(
                "foreign key violation: project {}",
                file.project
            )));
        }
        let id = t.allocate("files");
        let row = File {
            id,
            created: Utc::now(),
            owner: owner.to_string(),
            project: file.project,
            name: file.name.clone(),
            description: file.description.clone(),
            hash: file.hash.clone(),
            locator: file.locator.clone(),
        };
        t.files.insert(id, row.clone());
        Ok(row)
    }

    async fn get_file(&self, id: RecordId) -> Result<Option<File>> {
        Ok(self.read()?.files.get(&id).cloned())
    }

    async fn list_files(&self, project: RecordId) -> Result<Vec<File>> {
        Ok(self
            .read()?
            .files
            .values()
            .filter(|f| f.project == project)
            .cloned()
            .collect())
    }

    async fn insert_file_version(&self, version: &NewFileVersion) -> Result<FileVersion> {
        let mut t = self.write()?;
        if !t.files.contains_key(&version.file) {
            return Err(Error::storage(format!(
                "foreign key violation: file {}",
                version.file
            )));
        }
        let id = t.allocate("file_versions");
        let row = FileVersion {
            id,
            created: Utc::now(),
            file: version.file,
            hash: version.hash.clone(),
            complete: version.complete,
        };
        t.file_versions.insert(id, row.clone());
        Ok(row)
    }

    async fn get_file_version(&self, id: RecordId) -> Result<Option<FileVersion>> {
        Ok(self.read()?.file_versions.get(&id).cloned())
    }

    async fn list_file_versions(&self, file: RecordId) -> Result<Vec<FileVersion>> {
        Ok(self
            .read()?
            .file_versions
            .values()
            .filter(|v| v.file == file)
            .cloned()
            .collect())
    }

    async fn complete_file_version(&self, id: RecordId, hash: &str) -> Result<FileVersion> {
        let mut t = self.write()?;
        let row = t
            .file_versions
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("file_version", id))?;
        row.hash = hash.to_string();
        row.complete = true;
        Ok(row.clone())
    }

    async fn insert_instance_aggregate(
        &self,
        instance: &NewInstance,
        vectors: &[NewVector],
        annotations: &[NewAnnotation],
    ) -> Result<Instance> {
        let mut t = self.write()?;

        // Every check happens before the first row is written.
        if !t.file_versions.contains_key(&instance.file_version) {
            return Err(Error::aggregate_write(
                format!(
                    "foreign key violation: file_version {}",
                    instance.file_version
                ),
                None,
            ));
        }
        for (i, a) in annotations.iter().enumerate() {
            let taken = t.annotations.values().any(|row| row.uuid == a.uuid)
                || annotations[..i].iter().any(|prev| prev.uuid == a.uuid);
            if taken {
                return Err(Error::aggregate_write(
                    format!("duplicate annotation uuid {}", a.uuid),
                    None,
                ));
            }
        }

        let id = t.allocate("instances");
        let row = Instance {
            id,
            file_version: instance.file_version,
            owner: instance.owner.clone(),
            kind: instance.kind,
            offset: instance.offset,
            size: instance.size,
            count: instance.count,
        };
        t.instances.insert(id, row.clone());

        for v in vectors {
            let vid = t.allocate("vectors");
            t.vectors.insert(
                vid,
                Vector {
                    id: vid,
                    file_version: row.file_version,
                    instance: id,
                    kind: v.kind.clone(),
                    type_version: v.type_version,
                    data: v.data.clone(),
                },
            );
        }
        for a in annotations {
            let aid = t.allocate("annotations");
            t.annotations.insert(
                aid,
                Annotation {
                    id: aid,
                    uuid: a.uuid,
                    instance: id,
                    kind: a.kind.clone(),
                    data: a.data.clone(),
                },
            );
        }
        Ok(row)
    }

    async fn get_instance(&self, id: RecordId) -> Result<Option<Instance>> {
        Ok(self.read()?.instances.get(&id).cloned())
    }

    async fn list_instances(
        &self,
        file_version: RecordId,
        kind: Option<InstanceType>,
    ) -> Result<Vec<Instance>> {
        Ok(self
            .read()?
            .instances
            .values()
            .filter(|i| i.file_version == file_version)
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .cloned()
            .collect())
    }

    async fn list_vectors(&self, instance: RecordId) -> Result<Vec<Vector>> {
        Ok(self
            .read()?
            .vectors
            .values()
            .filter(|v| v.instance == instance)
            .cloned()
            .collect())
    }

    async fn list_vectors_by_file_version(
        &self,
        file_version: RecordId,
        kind: Option<&str>,
    ) -> Result<Vec<Vector>> {
        Ok(self
            .read()?
            .vectors
            .values()
            .filter(|v| v.file_version == file_version)
            .filter(|v| kind.map_or(true, |k| v.kind == k))
            .cloned()
            .collect())
    }

    async fn list_annotations(
        &self,
        instance: RecordId,
        kind: Option<&str>,
    ) -> Result<Vec<Annotation>> {
        Ok(self
            .read()?
            .annotations
            .values()
            .filter(|a| a.instance == instance)
            .filter(|a| kind.map_or(true, |k| a.kind == k))
            .cloned()
            .collect())
    }

    async fn count_annotations(&self, instance: RecordId) -> Result<u64> {
        Ok(self
            .read()?
            .annotations
            .values()
            .filter(|a| a.instance == instance)
            .count() as u64)
    }

    async fn get_annotation_by_uuid(&self, uuid: Uuid) -> Result<Option<Annotation>> {
        Ok(self
            .read()?
            .annotations
            .values()
            .find(|a| a.uuid == uuid)
            .cloned())
    }

    async fn insert_matches(&self, task: RecordId, matches: &[NewMatch]) -> Result<Vec<Match>> {
        let mut t = self.write()?;
        let mut rows = Vec::with_capacity(matches.len());
        for m in matches {
            let id = t.allocate("matches");
            let row = Match {
                id,
                from_instance: m.from_instance,
                to_instance: m.to_instance,
                task,
                kind: m.kind.clone(),
                score: m.score,
            };
            t.matches.insert(id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn list_matches(&self, task: RecordId) -> Result<Vec<Match>> {
        Ok(self
            .read()?
            .matches
            .values()
            .filter(|m| m.task == task)
            .cloned()
            .collect())
    }

    async fn insert_dependency(
        &self,
        dependent: RecordId,
        dependency: RecordId,
    ) -> Result<Dependency> {
        let mut t = self.write()?;
        let id = t.allocate("dependencies");
        let row = Dependency {
            id,
            dependent,
            dependency,
        };
        t.dependencies.insert(id, row.clone());
        Ok(row)
    }

    async fn list_dependencies(&self, dependent: RecordId) -> Result<Vec<Dependency>> {
        Ok(self
            .read()?
            .dependencies
            .values()
            .filter(|d| d.dependent == dependent)
            .cloned()
            .collect())
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let mut t = self.write()?;
        let id = t.allocate("tasks");
        let row = Task {
            id,
            task_id: task.task_id.clone(),
            created: task.created,
            owner: task.owner.clone(),
            target_project: task.target_project,
            target_file: task.target_file,
            source_file: task.source_file,
            source_file_version: task.source_file_version,
            source_start: task.source_start,
            source_end: task.source_end,
            matchers: task.matchers.clone(),
            strategy: task.strategy.clone(),
            state: task.state.clone(),
        };
        t.tasks.insert(id, row.clone());
        Ok(row)
    }

    async fn get_task(&self, id: RecordId) -> Result<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn update_task_state(
        &self,
        id: RecordId,
        expected: &TaskState,
        next: &TaskState,
    ) -> Result<Task> {
        let mut t = self.write()?;
        let row = t
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("task", id))?;
        if &row.state != expected {
            return Err(Error::Conflict {
                message: format!("task {} changed since it was read", id),
            });
        }
        row.state = next.clone();
        Ok(row.clone())
    }
}
