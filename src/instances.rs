//! Instance commands: aggregate import and the three read shapes.
//!
//! # Usage
//!
//! ```bash
//! # Import one instance (JSON object) or many (JSON array)
//! collab instance import instances.json --owner alice
//!
//! # Read back in the nested shape
//! collab instance show 12 --view nested
//! ```

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use collab_core::aggregate::{create_instance_aggregate, InstanceInput};
use collab_core::models::{InstanceType, RecordId};
use collab_core::store::Store;
use collab_core::views::{counted_instance, nested_instance, slim_instance, vector_view};

use crate::config::Config;
use crate::db;
use crate::output::print_json;

/// Which instance projection to print.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum InstanceView {
    Slim,
    #[default]
    Counted,
    Nested,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportBody {
    Many(Vec<InstanceInput>),
    One(Box<InstanceInput>),
}

/// Parses an import document: a single instance object or an array of them.
pub fn parse_import(content: &str) -> Result<Vec<InstanceInput>> {
    let body: ImportBody =
        serde_json::from_str(content).with_context(|| "Failed to parse instance JSON")?;
    Ok(match body {
        ImportBody::Many(list) => list,
        ImportBody::One(one) => vec![*one],
    })
}

pub async fn run_instance_import(config: &Config, owner: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read instance file: {}", path.display()))?;
    let inputs = parse_import(&content)?;

    let store = db::open_store(config).await?;
    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        let instance = create_instance_aggregate(&store, owner, input).await?;
        created.push(slim_instance(&store, &instance).await);
    }
    info!(count = created.len(), path = %path.display(), "instances imported");
    print_json(&created)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_instance_show(config: &Config, id: RecordId, view: InstanceView) -> Result<()> {
    let store = db::open_store(config).await?;
    let Some(instance) = store.get_instance(id).await? else {
        bail!("instance not found: {}", id);
    };
    match view {
        InstanceView::Slim => print_json(&slim_instance(&store, &instance).await)?,
        InstanceView::Counted => print_json(&counted_instance(&store, &instance).await?)?,
        InstanceView::Nested => print_json(&nested_instance(&store, &instance).await?)?,
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_instance_list(
    config: &Config,
    file_version: RecordId,
    kind: Option<InstanceType>,
) -> Result<()> {
    let store = db::open_store(config).await?;
    let mut rows = Vec::new();
    for instance in store.list_instances(file_version, kind).await? {
        rows.push(counted_instance(&store, &instance).await?);
    }
    print_json(&rows)?;
    store.pool().close().await;
    Ok(())
}

pub async fn run_vector_list(
    config: &Config,
    file_version: RecordId,
    kind: Option<&str>,
) -> Result<()> {
    let store = db::open_store(config).await?;
    let mut rows = Vec::new();
    for vector in store.list_vectors_by_file_version(file_version, kind).await? {
        rows.push(vector_view(&store, &vector).await?);
    }
    print_json(&rows)?;
    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_single_and_many() {
        let one = parse_import(r#"{"file_version": 1, "type": "function", "offset": 16}"#).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].offset, 16);

        let many = parse_import(
            r#"[{"file_version": 1, "type": "function", "offset": 16},
                {"file_version": 1, "type": "universal", "offset": 0}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].kind, InstanceType::Universal);
    }

    #[test]
    fn test_parse_import_rejects_unknown_type() {
        assert!(parse_import(r#"{"file_version": 1, "type": "blob", "offset": 0}"#).is_err());
    }
}
