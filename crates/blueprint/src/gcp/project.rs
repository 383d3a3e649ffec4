use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::GkeClusterSpec,
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::random_suffix_properties;

pub struct AddedProjects {
    pub cluster: ResourceRef,
    /// Same handle as `cluster` unless a shared VPC was requested.
    pub network: ResourceRef,
    /// API enablement resources of both projects.
    pub services: Vec<ResourceRef>,
}

impl AddedProjects {
    pub fn is_shared_vpc(&self) -> bool {
        self.cluster != self.network
    }
}

/// Cluster project plus, for shared VPC setups, a separate network project. Both get a
/// short random suffix since project ids are globally unique.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    folder: &ResourceRef,
) -> Result<AddedProjects> {
    let cluster = project(stack, locals, spec, provider, folder, "cluster", 'c')
        .wrap_err("failed to add cluster project")?;

    stack.export(outputs::CLUSTER_PROJECT_ID, cluster.output("projectId"))?;
    stack.export(outputs::CLUSTER_PROJECT_NUMBER, cluster.output("number"))?;

    let network = if spec.is_create_shared_vpc {
        project(stack, locals, spec, provider, folder, "network", 'n')
            .wrap_err("failed to add network project")?
    } else {
        cluster.clone()
    };

    stack.export(outputs::VPC_NETWORK_PROJECT_ID, network.output("projectId"))?;
    stack.export(outputs::VPC_NETWORK_PROJECT_NUMBER, network.output("number"))?;

    let mut services = enable_apis(
        stack,
        provider,
        &cluster,
        "container-cluster",
        vars::CLUSTER_PROJECT_APIS,
    )
    .wrap_err("failed to enable cluster project apis")?;

    if network != cluster {
        services.extend(
            enable_apis(
                stack,
                provider,
                &network,
                "network-project",
                vars::NETWORK_PROJECT_APIS,
            )
            .wrap_err("failed to enable network project apis")?,
        );
    }

    Ok(AddedProjects {
        cluster,
        network,
        services,
    })
}

fn project(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    folder: &ResourceRef,
    role: &str,
    marker: char,
) -> Result<ResourceRef> {
    let suffix = stack.declare(
        &format!("{role}-project-id-suffix"),
        "random:RandomString",
        random_suffix_properties(),
        ResourceOptions::new(),
    )?;

    let project_id = format!(
        "{}-{}-{marker}{}",
        vars::PROJECT_PREFIX,
        locals.cluster_name,
        suffix.output("result")
    );

    stack.declare(
        &format!("{role}-project"),
        "gcp:organizations:Project",
        json!({
            "name": project_id,
            "projectId": project_id,
            "billingAccount": spec.billing_account_id,
            "folderId": folder.output("folderId"),
            "autoCreateNetwork": false,
            "labels": locals.cloud_labels,
        }),
        ResourceOptions::new().parent(folder).provider(provider),
    )
}

fn enable_apis(
    stack: &mut Stack,
    provider: &ResourceRef,
    project: &ResourceRef,
    prefix: &str,
    apis: &[&str],
) -> Result<Vec<ResourceRef>> {
    apis.iter()
        .map(|api| {
            // dots would read as property access inside interpolations
            let service = api.split('.').next().unwrap_or(*api);
            stack
                .declare(
                    &format!("{prefix}-{service}"),
                    "gcp:projects:Service",
                    json!({
                        "project": project.output("projectId"),
                        "service": api,
                        "disableDependentServices": true,
                    }),
                    ResourceOptions::new().parent(project).provider(provider),
                )
                .wrap_err(format!("failed to enable {api} api"))
        })
        .collect()
}
