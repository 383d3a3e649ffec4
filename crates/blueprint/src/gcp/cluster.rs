use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::{ClusterAutoscalingConfig, GkeClusterSpec},
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::{network::AddedNetwork, project::AddedProjects, random_suffix_properties};

pub struct AddedCluster {
    pub cluster: ResourceRef,
    /// Project id of the cluster project, as an interpolation.
    pub project_id: String,
}

#[allow(clippy::too_many_arguments)]
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    folder: &ResourceRef,
    projects: &AddedProjects,
    network: &AddedNetwork,
    shared_vpc_bindings: &[ResourceRef],
) -> Result<AddedCluster> {
    let suffix = stack
        .declare(
            "cluster-name-suffix",
            "random:RandomString",
            random_suffix_properties(),
            ResourceOptions::new(),
        )
        .wrap_err("failed to add cluster name suffix")?;

    let project_id = projects.cluster.output("projectId");

    let cluster = stack.declare(
        "cluster",
        "gcp:container:Cluster",
        json!({
            "name": format!("{}-{}", locals.cluster_name, suffix.output("result")),
            "project": project_id,
            "location": spec.zone,
            "network": network.vpc.output("selfLink"),
            "subnetwork": network.sub_network.output("selfLink"),
            "removeDefaultNodePool": true,
            "deletionProtection": false,
            // the cluster never becomes ready with zero nodes
            "initialNodeCount": 1,
            "resourceLabels": locals.cloud_labels,
            "workloadIdentityConfig": {
                "workloadPool": format!("{project_id}.svc.id.goog"),
            },
            "releaseChannel": { "channel": vars::GKE_RELEASE_CHANNEL },
            "verticalPodAutoscaling": { "enabled": true },
            "addonsConfig": {
                "horizontalPodAutoscaling": { "disabled": false },
                "httpLoadBalancing": { "disabled": true },
                "istioConfig": { "disabled": true },
                "networkPolicyConfig": { "disabled": true },
            },
            "privateClusterConfig": {
                "enablePrivateEndpoint": false,
                "enablePrivateNodes": true,
                "masterIpv4CidrBlock": vars::API_SERVER_IP_CIDR,
            },
            "ipAllocationPolicy": {
                "clusterSecondaryRangeName": locals.pod_secondary_range_name,
                "servicesSecondaryRangeName": locals.service_secondary_range_name,
            },
            "masterAuthorizedNetworksConfig": {
                "cidrBlocks": [{
                    "cidrBlock": vars::MASTER_AUTHORIZED_NETWORKS_CIDR_BLOCK,
                    "displayName": vars::MASTER_AUTHORIZED_NETWORKS_DESCRIPTION,
                }],
            },
            "clusterAutoscaling": cluster_autoscaling(spec.cluster_autoscaling_config.as_ref()),
            "loggingConfig": { "enableComponents": vars::GKE_LOGGING_COMPONENTS },
        }),
        ResourceOptions::new()
            .parent(folder)
            .provider(provider)
            .depends_on(shared_vpc_bindings)
            .depends_on(&projects.services),
    )?;

    stack.export(outputs::CLUSTER_NAME, cluster.output("name"))?;
    stack.export(outputs::CLUSTER_ENDPOINT, cluster.output("endpoint"))?;
    stack.export(
        outputs::CLUSTER_CA_DATA,
        cluster.output("masterAuth.clusterCaCertificate"),
    )?;

    Ok(AddedCluster {
        cluster,
        project_id,
    })
}

fn cluster_autoscaling(config: Option<&ClusterAutoscalingConfig>) -> Value {
    match config {
        Some(config) if config.is_enabled => json!({
            "enabled": true,
            "autoscalingProfile": "OPTIMIZE_UTILIZATION",
            "resourceLimits": [
                {
                    "resourceType": "cpu",
                    "minimum": config.cpu_min_cores,
                    "maximum": config.cpu_max_cores,
                },
                {
                    "resourceType": "memory",
                    "minimum": config.memory_min_gb,
                    "maximum": config.memory_max_gb,
                },
            ],
        }),
        _ => json!({ "enabled": false }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::{StackInput, tests::GKE_INPUT};

    fn cluster_properties(data: &str) -> Value {
        let stack = crate::plan(&StackInput::from_yaml(data).unwrap()).unwrap();
        stack.resource("cluster").unwrap().properties.clone()
    }

    #[test]
    fn cluster_policy_is_baked_in() {
        let cluster = cluster_properties(GKE_INPUT);

        assert_eq!(cluster["removeDefaultNodePool"], true);
        assert_eq!(cluster["deletionProtection"], false);
        assert_eq!(cluster["initialNodeCount"], 1);
        assert_eq!(cluster["location"], "us-central1-a");
        assert_eq!(
            cluster["workloadIdentityConfig"]["workloadPool"],
            "${cluster-project.projectId}.svc.id.goog"
        );
        assert_eq!(cluster["releaseChannel"]["channel"], "REGULAR");
        assert_eq!(cluster["privateClusterConfig"]["masterIpv4CidrBlock"], "172.16.0.0/28");
        assert_eq!(
            cluster["masterAuthorizedNetworksConfig"]["cidrBlocks"][0]["displayName"],
            "kubectl-from-anywhere"
        );
        assert_eq!(cluster["addonsConfig"]["httpLoadBalancing"]["disabled"], true);
        assert_eq!(
            cluster["loggingConfig"]["enableComponents"],
            json!(["SYSTEM_COMPONENTS", "WORKLOADS"])
        );
        assert_eq!(cluster["name"], "demo-${cluster-name-suffix.result}");
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(false), false)]
    #[case(Some(true), true)]
    fn autoscaling_follows_config(#[case] enabled: Option<bool>, #[case] expected: bool) {
        let data = match enabled {
            None => GKE_INPUT.to_string(),
            Some(enabled) => format!(
                "{GKE_INPUT}    clusterAutoscalingConfig:\n      isEnabled: {enabled}\n      cpuMinCores: 2\n      cpuMaxCores: 16\n      memoryMinGb: 4\n      memoryMaxGb: 64\n"
            ),
        };
        let autoscaling = &cluster_properties(&data)["clusterAutoscaling"];

        assert_eq!(autoscaling["enabled"], expected);
        if expected {
            assert_eq!(autoscaling["autoscalingProfile"], "OPTIMIZE_UTILIZATION");
            assert_eq!(autoscaling["resourceLimits"][0]["maximum"], 16);
            assert_eq!(autoscaling["resourceLimits"][1]["minimum"], 4);
        } else {
            assert!(autoscaling.get("resourceLimits").is_none());
        }
    }
}
