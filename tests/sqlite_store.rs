use collab::config::{parse_config, Config};
use collab::sqlite_store::SqliteStore;
use collab::{db, migrate};
use collab_core::aggregate::{create_instance_aggregate, AnnotationInput, InstanceInput, VectorInput};
use collab_core::models::{
    Catalog, InstanceType, NewFile, NewFileVersion, NewMatch, NewProject, Payload, ProjectEdit,
    RecordId, TaskStatus,
};
use collab_core::naming::resolve_name;
use collab_core::records;
use collab_core::store::Store;
use collab_core::task::{apply_progress, create_task, edit_task, TaskEdit, TaskProgress, TaskRequest};
use collab_core::views::{counted_instance, nested_instance, project_view};
use collab_core::Error;
use tempfile::TempDir;
use uuid::Uuid;

fn test_config(tmp: &TempDir) -> Config {
    parse_config(&format!(
        "[db]\npath = \"{}/data/collab.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap()
}

async fn open(tmp: &TempDir) -> SqliteStore {
    let config = test_config(tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteStore::new(pool)
}

struct Fixture {
    _tmp: TempDir,
    store: SqliteStore,
    project: RecordId,
    file: RecordId,
    version: RecordId,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let project = records::create_project(
        &store,
        "alice",
        &NewProject {
            name: "firmware".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .id;
    let file = records::create_file(
        &store,
        "alice",
        &NewFile {
            project,
            name: "fw.bin".into(),
            hash: "ab".repeat(32),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .id;
    let version = records::create_file_version(
        &store,
        &NewFileVersion {
            file,
            hash: "ab".repeat(32),
            complete: true,
        },
    )
    .await
    .unwrap()
    .id;
    Fixture {
        _tmp: tmp,
        store,
        project,
        file,
        version,
    }
}

fn function_at(version: RecordId, offset: u64) -> InstanceInput {
    InstanceInput {
        file_version: version,
        kind: InstanceType::Function,
        offset,
        size: 0x40,
        count: 12,
        vectors: Vec::new(),
        annotations: Vec::new(),
    }
}

fn annotation(kind: &str, data: &str) -> AnnotationInput {
    AnnotationInput {
        uuid: None,
        kind: kind.into(),
        data: Payload::new(data),
    }
}

#[tokio::test]
async fn test_migrations_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
    assert!(config.db.path.exists());
}

#[tokio::test]
async fn test_project_round_trip_and_edit() {
    let fx = fixture().await;
    let view = project_view(&fx.store, &fx.store.get_project(fx.project).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(view.files, vec![fx.file]);
    assert_eq!(view.project.owner, "alice");

    let edited = records::edit_project(
        &fx.store,
        fx.project,
        &ProjectEdit {
            description: Some("router image".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(edited.name, "firmware");
    assert_eq!(edited.description, "router image");
    assert_eq!(edited.created, view.project.created);
}

#[tokio::test]
async fn test_aggregate_persists_children_under_version() {
    let fx = fixture().await;
    let other = records::create_file_version(
        &fx.store,
        &NewFileVersion {
            file: fx.file,
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .id;

    let mut input = function_at(fx.version, 0x1000);
    input.vectors = (0..3)
        .map(|i| VectorInput {
            file_version: Some(other),
            kind: "instruction_hash".into(),
            type_version: 1,
            data: Payload::new(format!("\"h{}\"", i)),
        })
        .collect();
    input.annotations = vec![
        annotation("name", r#"{"name": "parse_header"}"#),
        annotation("comment", r#"{"text": "checks magic"}"#),
    ];

    let instance = create_instance_aggregate(&fx.store, "bob", input).await.unwrap();
    assert_eq!(instance.file_version, fx.version);
    assert_eq!(instance.owner, "bob");

    let vectors = fx.store.list_vectors(instance.id).await.unwrap();
    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.file_version == fx.version));
    assert!(fx
        .store
        .list_vectors_by_file_version(other, None)
        .await
        .unwrap()
        .is_empty());

    let nested = nested_instance(&fx.store, &instance).await.unwrap();
    assert_eq!(nested.name, "parse_header");
    assert_eq!(nested.file, fx.file);
    assert_eq!(nested.vectors.len(), 3);
    assert_eq!(nested.annotations.len(), 2);
}

#[tokio::test]
async fn test_aggregate_rolls_back_on_duplicate_uuid() {
    let fx = fixture().await;
    let uuid = Uuid::new_v4();

    let mut first = function_at(fx.version, 0x10);
    first.annotations = vec![AnnotationInput {
        uuid: Some(uuid),
        ..annotation("name", r#"{"name": "a"}"#)
    }];
    create_instance_aggregate(&fx.store, "alice", first).await.unwrap();

    let mut second = function_at(fx.version, 0x20);
    second.vectors = vec![VectorInput {
        file_version: None,
        kind: "name_hash".into(),
        type_version: 0,
        data: Payload::new("1"),
    }];
    second.annotations = vec![AnnotationInput {
        uuid: Some(uuid),
        ..annotation("name", r#"{"name": "b"}"#)
    }];
    let err = create_instance_aggregate(&fx.store, "alice", second)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AggregateWrite { .. }), "got {:?}", err);

    let instances = fx.store.list_instances(fx.version, None).await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].offset, 0x10);
    assert!(fx
        .store
        .list_vectors_by_file_version(fx.version, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_name_resolution_and_counts() {
    let fx = fixture().await;

    let mut named = function_at(fx.version, 0x30);
    named.annotations = vec![
        annotation("name", r#"{"name": "first"}"#),
        annotation("name", r#"{"name": "second"}"#),
        annotation("comment", "{}"),
    ];
    let named = create_instance_aggregate(&fx.store, "alice", named).await.unwrap();
    assert_eq!(resolve_name(&fx.store, &named).await, "first");
    assert_eq!(
        counted_instance(&fx.store, &named).await.unwrap().annotation_count,
        3
    );

    let bare = create_instance_aggregate(&fx.store, "alice", function_at(fx.version, 0x1A))
        .await
        .unwrap();
    assert_eq!(resolve_name(&fx.store, &bare).await, "sub_1A");

    let mut broken = function_at(fx.version, 0xFF);
    broken.annotations = vec![annotation("name", "not json")];
    let broken = create_instance_aggregate(&fx.store, "alice", broken).await.unwrap();
    assert_eq!(resolve_name(&fx.store, &broken).await, "sub_FF");

    let mut universal = function_at(fx.version, 0);
    universal.kind = InstanceType::Universal;
    let universal = create_instance_aggregate(&fx.store, "alice", universal)
        .await
        .unwrap();
    assert_eq!(
        resolve_name(&fx.store, &universal).await,
        "Universal File Instance"
    );

    let functions = fx
        .store
        .list_instances(fx.version, Some(InstanceType::Function))
        .await
        .unwrap();
    assert_eq!(functions.len(), 3);
}

fn request(fx: &Fixture) -> TaskRequest {
    TaskRequest {
        target_project: Some(fx.project),
        target_file: None,
        source_file_version: fx.version,
        source_start: None,
        source_end: None,
        matchers: vec!["instruction_hash".into()],
        strategy: "all_strategy".into(),
    }
}

#[tokio::test]
async fn test_task_lifecycle_persists() {
    let fx = fixture().await;
    let task = create_task(&fx.store, &Catalog::builtin(), "alice", &request(&fx))
        .await
        .unwrap();
    assert_eq!(task.state.status, TaskStatus::Pending);
    assert_eq!(task.source_file, fx.file);

    let running = apply_progress(
        &fx.store,
        task.id,
        &TaskProgress {
            status: Some(TaskStatus::Running),
            progress_max: Some(10),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(running.state.progress_max, Some(10));

    let done = apply_progress(
        &fx.store,
        task.id,
        &TaskProgress {
            status: Some(TaskStatus::Completed),
            progress: Some(10),
            match_count: Some(4),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(done.state.finished.is_some());
    assert_eq!(done.state.match_count, 4);

    let err = apply_progress(
        &fx.store,
        task.id,
        &TaskProgress {
            progress: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.field(), Some("status"));
    assert_eq!(fx.store.get_task(task.id).await.unwrap().unwrap(), done);
}

#[tokio::test]
async fn test_oversized_runner_counters_are_rejected() {
    let fx = fixture().await;
    let task = create_task(&fx.store, &Catalog::builtin(), "alice", &request(&fx))
        .await
        .unwrap();
    let too_big = i64::MAX as u64 + 5;

    let err = apply_progress(
        &fx.store,
        task.id,
        &TaskProgress {
            status: Some(TaskStatus::Running),
            progress: Some(too_big),
            match_count: Some(too_big),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.field(), Some("progress"));
    assert_eq!(fx.store.get_task(task.id).await.unwrap().unwrap(), task);

    let stored = apply_progress(
        &fx.store,
        task.id,
        &TaskProgress {
            status: Some(TaskStatus::Running),
            match_count: Some(i64::MAX as u64),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(stored.state.match_count, i64::MAX as u64);
}

#[tokio::test]
async fn test_stale_state_write_is_a_conflict() {
    let fx = fixture().await;
    let task = create_task(&fx.store, &Catalog::builtin(), "alice", &request(&fx))
        .await
        .unwrap();

    let mut running = task.state.clone();
    running.status = TaskStatus::Running;
    fx.store
        .update_task_state(task.id, &task.state, &running)
        .await
        .unwrap();

    let err = fx
        .store
        .update_task_state(task.id, &task.state, &running)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    let err = fx
        .store
        .update_task_state(9999, &task.state, &running)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_task_edit_is_read_only() {
    let fx = fixture().await;
    let task = create_task(&fx.store, &Catalog::builtin(), "alice", &request(&fx))
        .await
        .unwrap();

    let err = edit_task(
        &fx.store,
        task.id,
        &TaskEdit {
            target_project: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.field(), Some("target_project"));

    let same = TaskEdit {
        matchers: Some(task.matchers.clone()),
        ..Default::default()
    };
    assert_eq!(edit_task(&fx.store, task.id, &same).await.unwrap(), task);
}

#[tokio::test]
async fn test_matches_recorded_in_order() {
    let fx = fixture().await;
    let a = create_instance_aggregate(&fx.store, "alice", function_at(fx.version, 0x100))
        .await
        .unwrap();
    let b = create_instance_aggregate(&fx.store, "alice", function_at(fx.version, 0x200))
        .await
        .unwrap();
    let task = create_task(&fx.store, &Catalog::builtin(), "alice", &request(&fx))
        .await
        .unwrap();

    let batch = vec![
        NewMatch {
            from_instance: a.id,
            to_instance: b.id,
            kind: "instruction_hash".into(),
            score: 1.0,
        },
        NewMatch {
            from_instance: b.id,
            to_instance: a.id,
            kind: "instruction_hash".into(),
            score: 0.5,
        },
    ];
    let rows = records::record_matches(&fx.store, task.id, &batch).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].id < rows[1].id);

    let listed = fx.store.list_matches(task.id).await.unwrap();
    assert_eq!(listed, rows);
    assert_eq!(listed[1].score, 0.5);

    let bad = vec![NewMatch {
        to_instance: 424242,
        ..batch[0].clone()
    }];
    let err = records::record_matches(&fx.store, task.id, &bad).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fx.store.list_matches(task.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_dependencies_and_version_completion() {
    let fx = fixture().await;
    let lib = records::create_file(
        &fx.store,
        "alice",
        &NewFile {
            project: fx.project,
            name: "libc.so".into(),
            hash: "cd".repeat(32),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    records::add_dependency(&fx.store, fx.file, lib.id).await.unwrap();
    let edges = fx.store.list_dependencies(fx.file).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].dependency, lib.id);
    assert!(records::add_dependency(&fx.store, fx.file, 404)
        .await
        .unwrap_err()
        .is_not_found());

    let pending = records::create_file_version(
        &fx.store,
        &NewFileVersion {
            file: lib.id,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(!pending.complete);
    let done = records::complete_file_version(&fx.store, pending.id, "ef")
        .await
        .unwrap();
    assert!(done.complete);
    assert_eq!(done.hash, "ef");
    let err = records::complete_file_version(&fx.store, pending.id, "00")
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("hash"));
}
