//! Display-name resolution for instances.
//!
//! A name comes from the instance's `"name"` annotation when one exists and
//! its payload is `{"name": "<label>"}`. Anything else (no annotation,
//! unparsable payload, missing key, non-string value, a failed lookup)
//! falls back to `sub_<OFFSET>` with the offset in uppercase hex. Universal
//! instances are always named [`UNIVERSAL_NAME`] without a lookup.
//!
//! When several `"name"` annotations exist, the one with the lowest id wins.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{Instance, InstanceType, NAME_ANNOTATION};
use crate::store::Store;

/// Fixed label of [`InstanceType::Universal`] instances.
pub const UNIVERSAL_NAME: &str = "Universal File Instance";

#[derive(Deserialize)]
struct NamePayload {
    name: String,
}

/// Fallback label for an instance at `offset`: `sub_` + uppercase hex,
/// unpadded and without a `0x` prefix.
pub fn fallback_name(offset: u64) -> String {
    format!("sub_{:X}", offset)
}

/// Resolves the display name of `instance`. Never fails.
pub async fn resolve_name(store: &dyn Store, instance: &Instance) -> String {
    if instance.kind == InstanceType::Universal {
        return UNIVERSAL_NAME.to_string();
    }

    match store
        .list_annotations(instance.id, Some(NAME_ANNOTATION))
        .await
    {
        Ok(annotations) => {
            if let Some(first) = annotations.iter().min_by_key(|a| a.id) {
                match first.data.parse::<NamePayload>() {
                    Ok(payload) => return payload.name,
                    Err(e) => debug!(
                        instance_id = instance.id,
                        annotation_id = first.id,
                        error = %e,
                        "unusable name annotation, using fallback"
                    ),
                }
            }
        }
        Err(e) => debug!(
            instance_id = instance.id,
            error = %e,
            "name lookup failed, using fallback"
        ),
    }

    fallback_name(instance.offset)
}

/// Number of annotations of any type attached to `instance`.
pub async fn annotation_count(store: &dyn Store, instance: &Instance) -> Result<u64> {
    store.count_annotations(instance.id).await
}
