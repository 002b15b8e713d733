//! Read-side projections of records into wire-safe shapes.
//!
//! Instances come in three shapes:
//!
//! | Shape | Fields |
//! |-------|--------|
//! | [`SlimInstance`] | id, type, resolved name, offset |
//! | [`CountedInstance`] | slim + annotation count |
//! | [`NestedInstance`] | slim + owner, file, file_version, size, count, vectors, annotations |
//!
//! The nested shape is the read mirror of
//! [`InstanceInput`](crate::aggregate::InstanceInput). Match and dependency
//! projections are plain field passthroughs.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Annotation, Dependency, File, Instance, InstanceType, Match, Payload, Project, RecordId,
    Vector,
};
use crate::naming::{annotation_count, resolve_name};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlimInstance {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub name: String,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountedInstance {
    #[serde(flatten)]
    pub slim: SlimInstance,
    pub annotation_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedVector {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub type_version: u32,
    pub data: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedAnnotation {
    pub id: RecordId,
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedInstance {
    pub id: RecordId,
    pub owner: String,
    pub file: RecordId,
    pub file_version: RecordId,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub count: u64,
    pub vectors: Vec<NestedVector>,
    pub annotations: Vec<NestedAnnotation>,
}

/// A vector with its file derived from the file version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorView {
    pub id: RecordId,
    pub file: RecordId,
    pub file_version: RecordId,
    pub instance: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub type_version: u32,
    pub data: Payload,
}

/// A project with the ids of the files it owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub files: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    pub from_instance: RecordId,
    pub to_instance: RecordId,
    pub task: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f64,
}

impl From<&Match> for MatchView {
    fn from(m: &Match) -> Self {
        Self {
            from_instance: m.from_instance,
            to_instance: m.to_instance,
            task: m.task,
            kind: m.kind.clone(),
            score: m.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyView {
    pub dependent: RecordId,
    pub dependency: RecordId,
}

impl From<&Dependency> for DependencyView {
    fn from(d: &Dependency) -> Self {
        Self {
            dependent: d.dependent,
            dependency: d.dependency,
        }
    }
}

impl From<&Vector> for NestedVector {
    fn from(v: &Vector) -> Self {
        Self {
            id: v.id,
            kind: v.kind.clone(),
            type_version: v.type_version,
            data: v.data.clone(),
        }
    }
}

impl From<&Annotation> for NestedAnnotation {
    fn from(a: &Annotation) -> Self {
        Self {
            id: a.id,
            uuid: a.uuid,
            kind: a.kind.clone(),
            data: a.data.clone(),
        }
    }
}

pub async fn slim_instance(store: &dyn Store, instance: &Instance) -> SlimInstance {
    SlimInstance {
        id: instance.id,
        kind: instance.kind,
        name: resolve_name(store, instance).await,
        offset: instance.offset,
    }
}

pub async fn counted_instance(store: &dyn Store, instance: &Instance) -> Result<CountedInstance> {
    Ok(CountedInstance {
        slim: slim_instance(store, instance).await,
        annotation_count: annotation_count(store, instance).await?,
    })
}

async fn file_of_version(store: &dyn Store, file_version: RecordId) -> Result<RecordId> {
    store
        .get_file_version(file_version)
        .await?
        .map(|v| v.file)
        .ok_or_else(|| Error::not_found("file_version", file_version))
}

pub async fn nested_instance(store: &dyn Store, instance: &Instance) -> Result<NestedInstance> {
    let file = file_of_version(store, instance.file_version).await?;
    let vectors = store.list_vectors(instance.id).await?;
    let annotations = store.list_annotations(instance.id, None).await?;

    Ok(NestedInstance {
        id: instance.id,
        owner: instance.owner.clone(),
        file,
        file_version: instance.file_version,
        kind: instance.kind,
        name: resolve_name(store, instance).await,
        offset: instance.offset,
        size: instance.size,
        count: instance.count,
        vectors: vectors.iter().map(NestedVector::from).collect(),
        annotations: annotations.iter().map(NestedAnnotation::from).collect(),
    })
}

pub async fn vector_view(store: &dyn Store, vector: &Vector) -> Result<VectorView> {
    Ok(VectorView {
        id: vector.id,
        file: file_of_version(store, vector.file_version).await?,
        file_version: vector.file_version,
        instance: vector.instance,
        kind: vector.kind.clone(),
        type_version: vector.type_version,
        data: vector.data.clone(),
    })
}

pub async fn project_view(store: &dyn Store, project: &Project) -> Result<ProjectView> {
    let files: Vec<RecordId> = store
        .list_files(project.id)
        .await?
        .iter()
        .map(|f: &File| f.id)
        .collect();
    Ok(ProjectView {
        project: project.clone(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{create_instance_aggregate, InstanceInput};
    use crate::models::{NewFile, NewFileVersion, NewProject};
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    async fn setup() -> (InMemoryStore, Project, File, RecordId) {
        let store = InMemoryStore::new();
        let project = store
            .insert_project(
                "alice",
                &NewProject {
                    name: "p".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let file = store
            .insert_file(
                "alice",
                &NewFile {
                    project: project.id,
                    name: "libc.so".into(),
                    hash: "h".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let fv = store
            .insert_file_version(&NewFileVersion {
                file: file.id,
                hash: "h".into(),
                complete: true,
            })
            .await
            .unwrap()
            .id;
        (store, project, file, fv)
    }

    fn input(fv: RecordId) -> InstanceInput {
        serde_json::from_value(json!({
            "file_version": fv,
            "type": "function",
            "offset": 26,
            "size": 8,
            "count": 2,
            "vectors": [{"type": "name_hash", "type_version": 2, "data": "ff00"}],
            "annotations": [
                {"type": "name", "data": "{\"name\": \"memcpy\"}"},
                {"type": "comment", "data": "\"hot\""}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_slim_and_counted_shapes() {
        let (store, _, _, fv) = setup().await;
        let inst = create_instance_aggregate(&store, "alice", input(fv))
            .await
            .unwrap();

        let counted = counted_instance(&store, &inst).await.unwrap();
        assert_eq!(counted.slim.name, "memcpy");
        assert_eq!(counted.annotation_count, 2);

        let v = serde_json::to_value(&counted).unwrap();
        assert_eq!(
            v,
            json!({"id": inst.id, "type": "function", "name": "memcpy", "offset": 26, "annotation_count": 2})
        );
    }

    #[tokio::test]
    async fn test_nested_mirrors_input() {
        let (store, _, file, fv) = setup().await;
        let inst = create_instance_aggregate(&store, "alice", input(fv))
            .await
            .unwrap();
        let nested = nested_instance(&store, &inst).await.unwrap();

        assert_eq!(nested.file, file.id);
        assert_eq!(nested.owner, "alice");
        assert_eq!(nested.vectors.len(), 1);
        assert_eq!(nested.vectors[0].kind, "name_hash");
        assert_eq!(nested.vectors[0].type_version, 2);
        assert_eq!(nested.annotations.len(), 2);

        let v = serde_json::to_value(&nested).unwrap();
        assert_eq!(v["vectors"][0]["data"], "ff00");
        assert!(v["vectors"][0].get("file_version").is_none());
        assert_eq!(v["annotations"][0]["type"], "name");
    }

    #[tokio::test]
    async fn test_vector_and_project_views() {
        let (store, project, file, fv) = setup().await;
        let inst = create_instance_aggregate(&store, "alice", input(fv))
            .await
            .unwrap();
        let vector = &store.list_vectors(inst.id).await.unwrap()[0];
        let view = vector_view(&store, vector).await.unwrap();
        assert_eq!(view.file, file.id);
        assert_eq!(view.file_version, fv);

        let pv = project_view(&store, &project).await.unwrap();
        assert_eq!(pv.files, vec![file.id]);
        let v = serde_json::to_value(&pv).unwrap();
        assert_eq!(v["owner"], "alice");
    }

    #[test]
    fn test_match_view_passthrough() {
        let m = Match {
            id: 9,
            from_instance: 1,
            to_instance: 2,
            task: 3,
            kind: "name_hash".into(),
            score: 87.5,
        };
        let v = serde_json::to_value(MatchView::from(&m)).unwrap();
        assert_eq!(
            v,
            json!({"from_instance": 1, "to_instance": 2, "task": 3, "type": "name_hash", "score": 87.5})
        );
    }
}
