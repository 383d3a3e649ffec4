//! Shared VPC permissions for the GKE service agents of the cluster project.
//!
//! See <https://cloud.google.com/kubernetes-engine/docs/how-to/cluster-shared-vpc>.

use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::GkeClusterSpec,
    stack::{ResourceOptions, ResourceRef, Stack},
};

use super::{network::AddedNetwork, project::AddedProjects};

const NETWORK_ADMIN_ROLE_ID: &str = "network.admin";

const NETWORK_ADMIN_PERMISSIONS: &[&str] = &[
    "compute.firewalls.create",
    "compute.firewalls.delete",
    "compute.firewalls.get",
    "compute.firewalls.list",
    "compute.firewalls.update",
    "compute.networks.updatePolicy",
];

/// Returns the bindings the cluster has to wait for.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    projects: &AddedProjects,
    network: &AddedNetwork,
) -> Result<Vec<ResourceRef>> {
    let host_project_id = projects.network.output("projectId");
    let service_project_number = projects.cluster.output("number");
    let cloud_services = format!(
        "serviceAccount:{service_project_number}@cloudservices.gserviceaccount.com"
    );
    let container_engine_robot = format!(
        "serviceAccount:service-{service_project_number}@container-engine-robot.iam.gserviceaccount.com"
    );
    let options = || {
        ResourceOptions::new()
            .parent(&network.sub_network)
            .provider(provider)
    };

    let role = stack
        .declare(
            "network-admin-role",
            "gcp:projects:IAMCustomRole",
            json!({
                "project": host_project_id,
                "roleId": NETWORK_ADMIN_ROLE_ID,
                "title": "Host Project Network and Security Admin",
                "description": "Administer network and security of the host project. Used by GKE automation on service projects.",
                "permissions": NETWORK_ADMIN_PERMISSIONS,
            }),
            options(),
        )
        .wrap_err("failed to add network admin custom role")?;

    let mut bindings = Vec::with_capacity(4);

    for (name, member) in [
        ("subnetwork-iam-cloudservices", &cloud_services),
        ("subnetwork-iam-container-engine-robot", &container_engine_robot),
    ] {
        bindings.push(
            stack
                .declare(
                    name,
                    "gcp:compute:SubnetworkIAMMember",
                    json!({
                        "project": host_project_id,
                        "region": spec.region,
                        "subnetwork": network.sub_network.output("selfLink"),
                        "role": "roles/compute.networkUser",
                        "member": member,
                    }),
                    options(),
                )
                .wrap_err("failed to add subnetwork network user binding")?,
        );
    }

    bindings.push(
        stack
            .declare(
                "host-service-agent-role",
                "gcp:projects:IAMMember",
                json!({
                    "project": host_project_id,
                    "role": "roles/container.hostServiceAgentUser",
                    "member": container_engine_robot,
                }),
                options(),
            )
            .wrap_err("failed to add host service agent binding")?,
    );

    bindings.push(
        stack
            .declare(
                "network-admin",
                "gcp:projects:IAMBinding",
                json!({
                    "project": host_project_id,
                    "role": role.output("name"),
                    "members": [container_engine_robot],
                }),
                options(),
            )
            .wrap_err("failed to bind network admin role")?,
    );

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{api::StackInput, api::tests::GKE_INPUT};

    const SHARED_VPC_TYPES: &[&str] = &[
        "gcp:projects:IAMCustomRole",
        "gcp:compute:SubnetworkIAMMember",
        "gcp:projects:IAMBinding",
    ];

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn shared_vpc_iam_exists_iff_projects_differ(#[case] shared_vpc: bool) {
        let data = GKE_INPUT.replace(
            "    zone: us-central1-a\n",
            &format!("    zone: us-central1-a\n    isCreateSharedVpc: {shared_vpc}\n"),
        );
        let stack = crate::plan(&StackInput::from_yaml(&data).unwrap()).unwrap();

        let projects_differ = stack.outputs()[crate::outputs::CLUSTER_PROJECT_ID]
            != stack.outputs()[crate::outputs::VPC_NETWORK_PROJECT_ID];
        assert_eq!(projects_differ, shared_vpc);

        for r#type in SHARED_VPC_TYPES {
            assert_eq!(
                stack.resources_of_type(r#type).next().is_some(),
                projects_differ,
                "{}",
                r#type
            );
        }
        assert_eq!(stack.resource("host-service-agent-role").is_some(), projects_differ);

        let cluster = stack.resource("cluster").unwrap();
        let waits_for_bindings = cluster
            .options
            .dependencies()
            .iter()
            .any(|d| d == "network-admin");
        assert_eq!(waits_for_bindings, projects_differ);
    }
}
