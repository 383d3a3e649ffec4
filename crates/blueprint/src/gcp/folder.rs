use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    api::GkeClusterSpec,
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

/// Folder grouping the cluster and network projects under the configured parent.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
) -> Result<ResourceRef> {
    let folder = stack.declare(
        "folder",
        "gcp:organizations:Folder",
        json!({
            "displayName": format!("{}-{}", vars::PROJECT_PREFIX, locals.cluster_name),
            "parent": spec.folder_parent,
        }),
        ResourceOptions::new().provider(provider),
    )?;

    stack.export(outputs::FOLDER_ID, folder.output("folderId"))?;
    stack.export(outputs::FOLDER_DISPLAY_NAME, folder.output("displayName"))?;
    stack.export(outputs::FOLDER_PARENT, folder.output("parent"))?;

    Ok(folder)
}
