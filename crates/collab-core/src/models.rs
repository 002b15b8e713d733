//! Record model for the collab backend.
//!
//! Persisted records (`Project`, `File`, `FileVersion`, `Instance`,
//! `Vector`, `Annotation`, `Match`, `Dependency`, `Task`) plus the
//! descriptor-only [`Matcher`] and [`Strategy`] types. The `New*` types are
//! what a [`Store`](crate::store::Store) receives on insert; ids and
//! timestamps are assigned by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Internal record identifier.
pub type RecordId = i64;

/// Opaque principal name injected by the identity collaborator.
pub type Owner = String;

// ─── Payload ────────────────────────────────────────────────────────

/// Opaque payload of a [`Vector`] or [`Annotation`].
///
/// Stored verbatim. Schema validation belongs to the matcher that produced
/// it; the core only ever parses `"name"` annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Encodes a JSON value as a payload.
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Parses the payload as JSON into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.0)
    }
}

impl From<&str> for Payload {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Payload {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

// ─── Projects and files ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: RecordId,
    pub created: DateTime<Utc>,
    pub owner: Owner,
    pub name: String,
    pub description: String,
    pub private: bool,
}

/// Requester-supplied fields of a new project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
}

/// Editable project fields. Owner and creation time have no edit path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct File {
    pub id: RecordId,
    pub created: DateTime<Utc>,
    pub owner: Owner,
    pub project: RecordId,
    pub name: String,
    pub description: String,
    /// Content hash of the uploaded binary.
    pub hash: String,
    /// Where the binary content lives; opaque to this layer.
    pub locator: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFile {
    pub project: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub hash: String,
    #[serde(default)]
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileVersion {
    pub id: RecordId,
    pub created: DateTime<Utc>,
    pub file: RecordId,
    pub hash: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFileVersion {
    pub file: RecordId,
    pub hash: String,
    #[serde(default)]
    pub complete: bool,
}

// ─── Instances ──────────────────────────────────────────────────────

/// Kind of analytic unit an [`Instance`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    EmptyData,
    Data,
    EmptyFunction,
    Function,
    /// The whole file treated as a single unit.
    Universal,
}

impl InstanceType {
    pub const ALL: [InstanceType; 5] = [
        Self::EmptyData,
        Self::Data,
        Self::EmptyFunction,
        Self::Function,
        Self::Universal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyData => "empty_data",
            Self::Data => "data",
            Self::EmptyFunction => "empty_function",
            Self::Function => "function",
            Self::Universal => "universal",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::validation("type", format!("unknown instance type '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: RecordId,
    pub file_version: RecordId,
    pub owner: Owner,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub offset: u64,
    pub size: u64,
    pub count: u64,
}

/// Instance row handed to [`Store::insert_instance_aggregate`](crate::store::Store::insert_instance_aggregate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstance {
    pub owner: Owner,
    pub file_version: RecordId,
    pub kind: InstanceType,
    pub offset: u64,
    pub size: u64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vector {
    pub id: RecordId,
    /// Always equal to the owning instance's `file_version`.
    pub file_version: RecordId,
    pub instance: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub type_version: u32,
    pub data: Payload,
}

/// Vector row of an aggregate insert. It carries no `file_version`: the
/// store takes it from the instance row it was inserted with.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVector {
    pub kind: String,
    pub type_version: u32,
    pub data: Payload,
}

/// Reserved annotation type whose payload is `{"name": "<label>"}`.
pub const NAME_ANNOTATION: &str = "name";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: RecordId,
    pub uuid: Uuid,
    pub instance: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub uuid: Uuid,
    pub kind: String,
    pub data: Payload,
}

// ─── Matches and dependencies ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: RecordId,
    pub from_instance: RecordId,
    pub to_instance: RecordId,
    pub task: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMatch {
    pub from_instance: RecordId,
    pub to_instance: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f64,
}

/// Directed edge: `dependent` needs `dependency`. Both ends are files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub id: RecordId,
    pub dependent: RecordId,
    pub dependency: RecordId,
}

// ─── Tasks ──────────────────────────────────────────────────────────

/// Task status; see [`TaskStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only: `pending -> running -> {completed, failed}`.
    ///
    /// Staying in a non-terminal status is allowed so the runner can report
    /// progress without a status change.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::validation(
                "status",
                format!("unknown task status '{}'", other),
            )),
        }
    }
}

/// The mutable field group of a [`Task`], owned by the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub progress: u64,
    pub progress_max: Option<u64>,
    pub local_count: u64,
    pub remote_count: u64,
    pub match_count: u64,
    pub finished: Option<DateTime<Utc>>,
}

impl TaskState {
    pub fn initial() -> Self {
        Self {
            status: TaskStatus::Pending,
            progress: 0,
            progress_max: None,
            local_count: 0,
            remote_count: 0,
            match_count: 0,
            finished: None,
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: RecordId,
    /// Externally visible job identifier.
    pub task_id: String,
    pub created: DateTime<Utc>,
    pub owner: Owner,
    pub target_project: Option<RecordId>,
    pub target_file: Option<RecordId>,
    /// Derived from `source_file_version` at creation.
    pub source_file: RecordId,
    pub source_file_version: RecordId,
    pub source_start: Option<u64>,
    pub source_end: Option<u64>,
    pub matchers: Vec<String>,
    pub strategy: String,
    #[serde(flatten)]
    pub state: TaskState,
}

/// Fully-populated task row handed to [`Store::insert_task`](crate::store::Store::insert_task).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub task_id: String,
    pub created: DateTime<Utc>,
    pub owner: Owner,
    pub target_project: Option<RecordId>,
    pub target_file: Option<RecordId>,
    pub source_file: RecordId,
    pub source_file_version: RecordId,
    pub source_start: Option<u64>,
    pub source_end: Option<u64>,
    pub matchers: Vec<String>,
    pub strategy: String,
    pub state: TaskState,
}

// ─── Engine capability descriptors ──────────────────────────────────

/// A matcher the engine offers. Tasks reference it by `match_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub match_type: String,
    pub vector_type: String,
    pub matcher_name: String,
    #[serde(default)]
    pub matcher_description: String,
}

/// A strategy the engine offers. Tasks reference it by `strategy_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub strategy_type: String,
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_description: String,
}

/// Read-only set of matchers and strategies a task may reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    pub matchers: Vec<Matcher>,
    pub strategies: Vec<Strategy>,
}

impl Catalog {
    pub fn new(matchers: Vec<Matcher>, strategies: Vec<Strategy>) -> Self {
        Self {
            matchers,
            strategies,
        }
    }

    /// The matchers and strategies shipped with the engine.
    pub fn builtin() -> Self {
        let matcher = |match_type: &str, vector_type: &str, name: &str, desc: &str| Matcher {
            match_type: match_type.to_string(),
            vector_type: vector_type.to_string(),
            matcher_name: name.to_string(),
            matcher_description: desc.to_string(),
        };
        let strategy = |strategy_type: &str, name: &str, desc: &str| Strategy {
            strategy_type: strategy_type.to_string(),
            strategy_name: name.to_string(),
            strategy_description: desc.to_string(),
        };
        Self {
            matchers: vec![
                matcher(
                    "instruction_hash",
                    "instruction_hash",
                    "Instruction Hash",
                    "Exact match on a hash of the normalized instruction bytes",
                ),
                matcher(
                    "identity_hash",
                    "identity_hash",
                    "Identity Hash",
                    "Exact match on a hash of the raw instruction bytes",
                ),
                matcher(
                    "name_hash",
                    "name_hash",
                    "Name Hash",
                    "Exact match on a hash of the symbol name",
                ),
                matcher(
                    "mnemonic_hist",
                    "mnemonic_hist",
                    "Mnemonic Histogram",
                    "Similarity of instruction mnemonic histograms",
                ),
            ],
            strategies: vec![
                strategy(
                    "all_strategy",
                    "All",
                    "Compare every source instance against every target instance",
                ),
                strategy(
                    "binning_strategy",
                    "Binning",
                    "Only compare instances that fall into the same size bin",
                ),
            ],
        }
    }

    pub fn matcher(&self, match_type: &str) -> Option<&Matcher> {
        self.matchers.iter().find(|m| m.match_type == match_type)
    }

    pub fn strategy(&self, strategy_type: &str) -> Option<&Strategy> {
        self.strategies
            .iter()
            .find(|s| s.strategy_type == strategy_type)
    }
}
