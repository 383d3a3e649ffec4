use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    addons::{self, AddonContext, WorkloadIdentity},
    api::GkeClusterStackInput,
    locals::Locals,
    stack::Stack,
};

pub mod cluster;
pub mod folder;
pub mod iam;
pub mod kubernetes;
pub mod network;
pub mod node_pool;
pub mod project;
pub mod provider;
pub mod shared_vpc_iam;

/// Declare the complete GKE stack: folder, projects, network, cluster, node pools,
/// workload-deployer identity and the enabled add-ons.
#[instrument(level = Level::DEBUG, skip(stack, input))]
pub fn resources(stack: &mut Stack, input: &GkeClusterStackInput) -> Result<()> {
    let locals = Locals::for_gke(&input.target)?;
    let spec = &input.target.spec;

    let gcp_provider = provider::resources(stack, &input.gcp_credential)
        .wrap_err("failed to set up google provider")?;

    let folder = folder::resources(stack, &locals, spec, &gcp_provider)
        .wrap_err("failed to add folder")?;

    let projects = project::resources(stack, &locals, spec, &gcp_provider, &folder)
        .wrap_err("failed to add projects")?;

    let network = network::resources(stack, &locals, spec, &gcp_provider, &projects)
        .wrap_err("failed to add network")?;

    let shared_vpc_bindings = if projects.is_shared_vpc() {
        shared_vpc_iam::resources(stack, spec, &gcp_provider, &projects, &network)
            .wrap_err("failed to add shared vpc iam resources")?
    } else {
        Vec::new()
    };

    let cluster = cluster::resources(
        stack,
        &locals,
        spec,
        &gcp_provider,
        &folder,
        &projects,
        &network,
        &shared_vpc_bindings,
    )
    .wrap_err("failed to add container cluster")?;

    let node_pools = node_pool::resources(stack, &locals, spec, &gcp_provider, &cluster)
        .wrap_err("failed to add node pools")?;

    iam::resources(stack, &gcp_provider, &projects)
        .wrap_err("failed to add workload deployer iam resources")?;

    let kubernetes_provider =
        kubernetes::provider(stack, &gcp_provider, &cluster, &node_pools)
            .wrap_err("failed to set up kubernetes provider")?;

    let context = AddonContext {
        cluster_name: locals.cluster_name.clone(),
        kubernetes_provider,
        identity: WorkloadIdentity::Gcp {
            provider: gcp_provider,
            project_id: cluster.project_id.clone(),
            cluster: cluster.cluster.clone(),
        },
        labels: locals.kubernetes_labels.clone(),
        domain_filters: spec.kubernetes_addons.external_dns_domain_filters.clone(),
    };
    addons::resources(stack, &context, &spec.kubernetes_addons).wrap_err("failed to add addons")?;

    Ok(())
}

/// Properties of a `random:RandomString` suitable for project id and name suffixes.
pub(crate) fn random_suffix_properties() -> serde_json::Value {
    serde_json::json!({
        "length": crate::vars::RANDOM_SUFFIX_LENGTH,
        "special": false,
        "lower": true,
        "upper": false,
        "numeric": true,
    })
}
