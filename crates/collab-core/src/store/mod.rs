//! Storage abstraction for the collab backend.
//!
//! The [`Store`] trait is the logical read/write contract the core needs
//! from a persistence engine: create, batch-create, point reads, filtered
//! reads by foreign key and type tag, and a count for the annotation view.
//! Referential checks that produce caller-facing errors live in the core
//! operations, not here; stores only report what they were asked.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Annotation, Dependency, File, FileVersion, Instance, InstanceType, Match, NewAnnotation,
    NewFile, NewFileVersion, NewInstance, NewMatch, NewProject, NewTask, NewVector, Project,
    ProjectEdit, RecordId, Task, TaskState, Vector,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_instance_aggregate`](Store::insert_instance_aggregate) | Instance + vectors + annotations, all or nothing |
/// | [`list_annotations`](Store::list_annotations) | Annotations of an instance, ascending id |
/// | [`count_annotations`](Store::count_annotations) | Annotation count for the counted view |
/// | [`insert_task`](Store::insert_task) | Persist a validated task |
/// | [`update_task_state`](Store::update_task_state) | Compare-and-swap of a task's mutable group |
///
/// Every `list_*` method returns rows in ascending id order.
#[async_trait]
pub trait Store: Send + Sync {
    // Projects

    async fn insert_project(&self, owner: &str, project: &NewProject) -> Result<Project>;

    async fn get_project(&self, id: RecordId) -> Result<Option<Project>>;

    /// Applies the editable fields of `edit`. Returns `NotFound` if the
    /// project does not exist.
    async fn update_project(&self, id: RecordId, edit: &ProjectEdit) -> Result<Project>;

    // Files

    async fn insert_file(&self, owner: &str, file: &NewFile) -> Result<File>;

    async fn get_file(&self, id: RecordId) -> Result<Option<File>>;

    async fn list_files(&self, project: RecordId) -> Result<Vec<File>>;

    // File versions

    async fn insert_file_version(&self, version: &NewFileVersion) -> Result<FileVersion>;

    async fn get_file_version(&self, id: RecordId) -> Result<Option<FileVersion>>;

    /// The version history of a file, oldest first.
    async fn list_file_versions(&self, file: RecordId) -> Result<Vec<FileVersion>>;

    /// Sets the hash and marks the version complete.
    async fn complete_file_version(&self, id: RecordId, hash: &str) -> Result<FileVersion>;

    // Instance aggregate

    /// Inserts the instance row, then every vector and annotation as one
    /// batch each, inside a single atomic scope.
    ///
    /// Each vector's `file_version` is taken from `instance`. On any
    /// failure nothing is persisted and `Error::AggregateWrite` is returned.
    async fn insert_instance_aggregate(
        &self,
        instance: &NewInstance,
        vectors: &[NewVector],
        annotations: &[NewAnnotation],
    ) -> Result<Instance>;

    async fn get_instance(&self, id: RecordId) -> Result<Option<Instance>>;

    async fn list_instances(
        &self,
        file_version: RecordId,
        kind: Option<InstanceType>,
    ) -> Result<Vec<Instance>>;

    // Vectors

    async fn list_vectors(&self, instance: RecordId) -> Result<Vec<Vector>>;

    async fn list_vectors_by_file_version(
        &self,
        file_version: RecordId,
        kind: Option<&str>,
    ) -> Result<Vec<Vector>>;

    // Annotations

    async fn list_annotations(&self, instance: RecordId, kind: Option<&str>)
        -> Result<Vec<Annotation>>;

    async fn count_annotations(&self, instance: RecordId) -> Result<u64>;

    async fn get_annotation_by_uuid(&self, uuid: Uuid) -> Result<Option<Annotation>>;

    // Matches

    /// Inserts all matches for `task` as one batch.
    async fn insert_matches(&self, task: RecordId, matches: &[NewMatch]) -> Result<Vec<Match>>;

    async fn list_matches(&self, task: RecordId) -> Result<Vec<Match>>;

    // Dependencies

    async fn insert_dependency(&self, dependent: RecordId, dependency: RecordId)
        -> Result<Dependency>;

    async fn list_dependencies(&self, dependent: RecordId) -> Result<Vec<Dependency>>;

    // Tasks

    async fn insert_task(&self, task: &NewTask) -> Result<Task>;

    async fn get_task(&self, id: RecordId) -> Result<Option<Task>>;

    /// Replaces the task's mutable group with `next` if it still equals
    /// `expected`.
    ///
    /// Returns `NotFound` for an unknown task and `Conflict` when another
    /// writer got there first. The defining fields are never touched.
    async fn update_task_state(
        &self,
        id: RecordId,
        expected: &TaskState,
        next: &TaskState,
    ) -> Result<Task>;
}
