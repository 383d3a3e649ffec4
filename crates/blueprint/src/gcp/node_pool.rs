use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::{GkeClusterSpec, NodePool},
    locals::Locals,
    outputs::{self, NodePoolAttribute},
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::cluster::AddedCluster;

const MAX_SURGE: u32 = 2;
const MAX_UNAVAILABLE: u32 = 1;

#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    cluster: &AddedCluster,
) -> Result<Vec<ResourceRef>> {
    spec.node_pools
        .iter()
        .map(|pool| {
            node_pool(stack, locals, spec, provider, cluster, pool)
                .wrap_err(format!("failed to add {} node pool", pool.name))
        })
        .collect()
}

fn node_pool(
    stack: &mut Stack,
    locals: &Locals,
    spec: &GkeClusterSpec,
    provider: &ResourceRef,
    cluster: &AddedCluster,
    pool: &NodePool,
) -> Result<ResourceRef> {
    let node_pool = stack.declare(
        &format!("node-pool-{}", pool.name),
        "gcp:container:NodePool",
        json!({
            "name": pool.name,
            "location": spec.zone,
            "project": cluster.project_id,
            "cluster": cluster.cluster.output("name"),
            "nodeCount": pool.min_node_count,
            "autoscaling": {
                "minNodeCount": pool.min_node_count,
                "maxNodeCount": pool.max_node_count,
            },
            "management": {
                "autoRepair": true,
                "autoUpgrade": true,
            },
            "nodeConfig": {
                "machineType": pool.machine_type,
                "labels": locals.cloud_labels,
                "metadata": { "disable-legacy-endpoints": "true" },
                "oauthScopes": vars::NODE_POOL_OAUTH_SCOPES,
                "preemptible": pool.is_spot_enabled,
                "tags": [locals.network_tag],
                "workloadMetadataConfig": { "mode": "GKE_METADATA" },
            },
            "upgradeSettings": {
                "maxSurge": MAX_SURGE,
                "maxUnavailable": MAX_UNAVAILABLE,
            },
        }),
        ResourceOptions::new()
            .parent(&cluster.cluster)
            .provider(provider)
            // the autoscaler owns the node count after creation
            .ignore_changes(&["nodeCount"])
            .delete_before_replace(true),
    )?;

    stack.export(
        &outputs::node_pool_key(&pool.name, NodePoolAttribute::Name),
        node_pool.output("name"),
    )?;
    stack.export(
        &outputs::node_pool_key(&pool.name, NodePoolAttribute::MachineType),
        node_pool.output("nodeConfig.machineType"),
    )?;
    stack.export(
        &outputs::node_pool_key(&pool.name, NodePoolAttribute::SpotInstances),
        node_pool.output("nodeConfig.preemptible"),
    )?;

    Ok(node_pool)
}

#[cfg(test)]
mod tests {
    use crate::{
        api::{StackInput, tests::GKE_INPUT},
        outputs::{NodePoolAttribute, node_pool_key},
    };

    const TWO_POOLS: &str = "      - name: spot\n        machineType: e2-standard-8\n        minNodeCount: 0\n        maxNodeCount: 10\n        isSpotEnabled: true\n";

    #[test]
    fn one_node_pool_per_declared_pool() {
        let data = format!("{GKE_INPUT}{TWO_POOLS}");
        let stack = crate::plan(&StackInput::from_yaml(&data).unwrap()).unwrap();

        let pools: Vec<_> = stack
            .resources_of_type("gcp:container:NodePool")
            .map(|(name, _)| name)
            .collect();
        assert_eq!(pools, ["node-pool-general", "node-pool-spot"]);

        let spot = stack.resource("node-pool-spot").unwrap();
        assert_eq!(spot.properties["nodeCount"], 0);
        assert_eq!(spot.properties["autoscaling"]["maxNodeCount"], 10);
        assert_eq!(spot.properties["nodeConfig"]["preemptible"], true);
        assert_eq!(spot.properties["nodeConfig"]["workloadMetadataConfig"]["mode"], "GKE_METADATA");
        assert_eq!(spot.options.ignored_changes(), ["nodeCount"]);
        assert!(spot.options.is_delete_before_replace());
        assert_eq!(spot.options.parent_name(), Some("cluster"));

        for pool in ["general", "spot"] {
            for attribute in [
                NodePoolAttribute::Name,
                NodePoolAttribute::MachineType,
                NodePoolAttribute::SpotInstances,
            ] {
                assert!(stack.outputs().contains_key(&node_pool_key(pool, attribute)));
            }
        }
    }
}
