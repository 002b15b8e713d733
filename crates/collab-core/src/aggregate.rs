//! Instance aggregate writer.
//!
//! An instance is written together with its feature vectors and
//! annotations. The input shape mirrors the nested instance view
//! ([`crate::views::NestedInstance`]) so that what a job runner posts can
//! be fetched back in the same form.
//!
//! The whole aggregate is written in one atomic scope provided by the
//! store: either the instance and every nested row exist afterwards, or
//! none of them do.

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Instance, InstanceType, NewAnnotation, NewInstance, NewVector, Payload, RecordId,
};
use crate::store::Store;

/// Writable fields of a vector nested in an [`InstanceInput`].
#[derive(Debug, Clone, Deserialize)]
pub struct VectorInput {
    /// Ignored: a vector always belongs to its instance's file version.
    #[serde(default)]
    pub file_version: Option<RecordId>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub type_version: u32,
    pub data: Payload,
}

/// Writable fields of an annotation nested in an [`InstanceInput`].
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationInput {
    /// External identifier; generated when absent.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Payload,
}

/// Writable fields of an instance plus its nested collections.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceInput {
    pub file_version: RecordId,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub offset: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub vectors: Vec<VectorInput>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInput>,
}

impl InstanceInput {
    /// Offsets and sizes are stored as signed 64-bit values and the range
    /// they describe must be representable.
    fn validate(&self) -> Result<()> {
        if self.offset > i64::MAX as u64 {
            return Err(Error::validation("offset", "exceeds the storable range"));
        }
        if self.size > i64::MAX as u64 {
            return Err(Error::validation("size", "exceeds the storable range"));
        }
        if self.count > i64::MAX as u64 {
            return Err(Error::validation("count", "exceeds the storable range"));
        }
        match self.offset.checked_add(self.size) {
            Some(end) if end <= i64::MAX as u64 => {}
            _ => return Err(Error::validation("size", "offset + size overflows")),
        }
        for v in &self.vectors {
            if v.kind.is_empty() {
                return Err(Error::validation("vectors.type", "must not be empty"));
            }
        }
        for a in &self.annotations {
            if a.kind.is_empty() {
                return Err(Error::validation("annotations.type", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Creates an instance with its vectors and annotations on behalf of
/// `owner` and returns the persisted instance. Nested rows must be
/// re-queried.
pub async fn create_instance_aggregate(
    store: &dyn Store,
    owner: &str,
    input: InstanceInput,
) -> Result<Instance> {
    input.validate()?;
    store
        .get_file_version(input.file_version)
        .await?
        .ok_or_else(|| Error::not_found("file_version", input.file_version))?;

    let instance = NewInstance {
        owner: owner.to_string(),
        file_version: input.file_version,
        kind: input.kind,
        offset: input.offset,
        size: input.size,
        count: input.count,
    };

    let vectors: Vec<NewVector> = input
        .vectors
        .into_iter()
        .map(|v| {
            if let Some(supplied) = v.file_version.filter(|fv| *fv != input.file_version) {
                debug!(
                    supplied,
                    file_version = input.file_version,
                    "overriding vector file_version with the instance's"
                );
            }
            NewVector {
                kind: v.kind,
                type_version: v.type_version,
                data: v.data,
            }
        })
        .collect();

    let annotations: Vec<NewAnnotation> = input
        .annotations
        .into_iter()
        .map(|a| NewAnnotation {
            uuid: a.uuid.unwrap_or_else(Uuid::new_v4),
            kind: a.kind,
            data: a.data,
        })
        .collect();

    let created = store
        .insert_instance_aggregate(&instance, &vectors, &annotations)
        .await?;
    info!(
        instance_id = created.id,
        file_version = created.file_version,
        vectors = vectors.len(),
        annotations = annotations.len(),
        "instance aggregate created"
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewFile, NewFileVersion, NewProject};
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    async fn two_versions(store: &InMemoryStore) -> (RecordId, RecordId) {
        let p = store
            .insert_project("alice", &NewProject::default())
            .await
            .unwrap();
        let f = store
            .insert_file(
                "alice",
                &NewFile {
                    project: p.id,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut ids = Vec::new();
        for _ in 0..2 {
            ids.push(
                store
                    .insert_file_version(&NewFileVersion {
                        file: f.id,
                        ..Default::default()
                    })
                    .await
                    .unwrap()
                    .id,
            );
        }
        (ids[0], ids[1])
    }

    fn input(file_version: RecordId, other_version: RecordId) -> InstanceInput {
        serde_json::from_value(json!({
            "file_version": file_version,
            "type": "function",
            "offset": 4096,
            "size": 32,
            "count": 7,
            "vectors": [
                {"type": "instruction_hash", "type_version": 0, "data": "a1"},
                {"type": "name_hash", "type_version": 1, "data": "b2", "file_version": other_version},
                {"type": "mnemonic_hist", "data": "{\"mov\": 3}"}
            ],
            "annotations": [
                {"type": "name", "data": "{\"name\": \"main\"}"},
                {"type": "comment", "data": "{\"text\": \"entry\"}"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_counts_and_references() {
        let store = InMemoryStore::new();
        let (fv, other) = two_versions(&store).await;
        let inst = create_instance_aggregate(&store, "alice", input(fv, other))
            .await
            .unwrap();

        assert_eq!(store.list_instances(fv, None).await.unwrap().len(), 1);
        let vectors = store.list_vectors(inst.id).await.unwrap();
        let annotations = store.list_annotations(inst.id, None).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(annotations.len(), 2);
        assert!(vectors.iter().all(|v| v.instance == inst.id));
        assert!(annotations.iter().all(|a| a.instance == inst.id));
        assert_eq!(inst.owner, "alice");
    }

    #[tokio::test]
    async fn test_vector_file_version_is_forced() {
        let store = InMemoryStore::new();
        let (fv, other) = two_versions(&store).await;
        let inst = create_instance_aggregate(&store, "alice", input(fv, other))
            .await
            .unwrap();
        for v in store.list_vectors(inst.id).await.unwrap() {
            assert_eq!(v.file_version, inst.file_version);
        }
        assert!(store
            .list_vectors_by_file_version(other, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_nested_lists() {
        let store = InMemoryStore::new();
        let (fv, _) = two_versions(&store).await;
        let inst = create_instance_aggregate(
            &store,
            "bob",
            serde_json::from_value(json!({"file_version": fv, "type": "universal", "offset": 0}))
                .unwrap(),
        )
        .await
        .unwrap();
        assert!(store.list_vectors(inst.id).await.unwrap().is_empty());
        assert_eq!(store.count_annotations(inst.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_version_is_not_found() {
        let store = InMemoryStore::new();
        let err = create_instance_aggregate(&store, "alice", input(77, 78))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "file_version not found: 77");
    }

    #[tokio::test]
    async fn test_overflowing_range_is_rejected() {
        let store = InMemoryStore::new();
        let (fv, other) = two_versions(&store).await;
        let mut bad = input(fv, other);
        bad.offset = i64::MAX as u64;
        bad.size = 1;
        let err = create_instance_aggregate(&store, "alice", bad)
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("size"));

        let mut bad = input(fv, other);
        bad.offset = u64::MAX;
        let err = create_instance_aggregate(&store, "alice", bad)
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("offset"));
        assert!(store.list_instances(fv, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_supplied_uuid_is_kept() {
        let store = InMemoryStore::new();
        let (fv, other) = two_versions(&store).await;
        let uuid = Uuid::new_v4();
        let mut inp = input(fv, other);
        inp.annotations[0].uuid = Some(uuid);
        let inst = create_instance_aggregate(&store, "alice", inp).await.unwrap();
        let found = store.get_annotation_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(found.instance, inst.id);
    }
}
