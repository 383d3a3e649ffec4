use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    Result, WrapErr,
    stack::{ResourceRef, Stack},
};

use super::AddonContext;

pub const CONFIG_GROUP_TYPE: &str = "kubernetes:yaml/v2:ConfigGroup";

/// Apply typed objects as one config group once `parent` and everything in `after` are
/// ready.
pub fn objects<T: Serialize>(
    stack: &mut Stack,
    context: &AddonContext,
    name: &str,
    objects: &[T],
    parent: &ResourceRef,
    after: &[&ResourceRef],
) -> Result<ResourceRef> {
    let objs = objects
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .wrap_err(format!("failed to serialize {name} manifests"))?;

    stack
        .declare(
            name,
            CONFIG_GROUP_TYPE,
            json!({ "objs": objs }),
            context
                .kubernetes()
                .parent(parent)
                .depends_on([parent])
                .depends_on(after.iter().copied()),
        )
        .wrap_err(format!("failed to add {name} manifests"))
}

/// Apply the manifests published at `urls`.
pub fn files(
    stack: &mut Stack,
    context: &AddonContext,
    name: &str,
    urls: &[&str],
    parent: &ResourceRef,
) -> Result<ResourceRef> {
    stack
        .declare(
            name,
            CONFIG_GROUP_TYPE,
            json!({ "files": urls }),
            context.kubernetes().parent(parent),
        )
        .wrap_err(format!("failed to add {name} manifests"))
}
