use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::project::AddedProjects;

/// Service account that downstream stacks use to deploy workloads, with cluster admin on
/// the cluster project and a key exported for those stacks.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    provider: &ResourceRef,
    projects: &AddedProjects,
) -> Result<ResourceRef> {
    let name = vars::WORKLOAD_DEPLOYER_SERVICE_ACCOUNT;

    let account = stack.declare(
        name,
        "gcp:serviceaccount:Account",
        json!({
            "project": projects.cluster.output("projectId"),
            "accountId": name,
            "displayName": name,
            "description": "deploys workloads to the cluster",
        }),
        ResourceOptions::new()
            .parent(&projects.cluster)
            .provider(provider),
    )?;

    stack.declare(
        &format!("{name}-container-admin"),
        "gcp:projects:IAMMember",
        json!({
            "project": projects.cluster.output("projectId"),
            "role": "roles/container.admin",
            "member": format!("serviceAccount:{}", account.output("email")),
        }),
        ResourceOptions::new().parent(&account).provider(provider),
    )?;

    let key = stack.declare(
        &format!("{name}-key"),
        "gcp:serviceaccount:Key",
        json!({ "serviceAccountId": account.output("name") }),
        ResourceOptions::new().parent(&account).provider(provider),
    )?;

    stack.export(outputs::WORKLOAD_DEPLOYER_GSA_EMAIL, account.output("email"))?;
    // already base64 encoded by the provider
    stack.export(outputs::WORKLOAD_DEPLOYER_GSA_KEY, key.output("privateKey"))?;

    Ok(account)
}
