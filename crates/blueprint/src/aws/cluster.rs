use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    api::EksClusterSpec,
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::network::AddedNetwork;

/// EKS cluster with a managed default node group and an OIDC provider for IRSA.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &EksClusterSpec,
    provider: &ResourceRef,
    network: &AddedNetwork,
) -> Result<ResourceRef> {
    let cluster = stack.declare(
        "cluster",
        "eks:Cluster",
        json!({
            "name": locals.cluster_name,
            "vpcId": network.vpc_id,
            "publicSubnetIds": network.public_subnet_ids,
            "privateSubnetIds": network.private_subnet_ids,
            "instanceType": spec.instance_type,
            "desiredCapacity": spec.desired_capacity,
            "minSize": spec.min_size,
            "maxSize": spec.max_size,
            "storageClasses": vars::EKS_STORAGE_CLASS,
            "createOidcProvider": true,
            "tags": locals.cloud_labels,
        }),
        ResourceOptions::new()
            .provider(provider)
            .depends_on(network.vpc.as_ref()),
    )?;

    stack.export(outputs::CLUSTER_NAME, cluster.output("eksCluster.name"))?;
    stack.export(outputs::KUBECONFIG, cluster.output("kubeconfigJson"))?;
    stack.export(outputs::CLUSTER_ENDPOINT, cluster.output("eksCluster.endpoint"))?;
    stack.export(
        outputs::CLUSTER_CA_DATA,
        cluster.output("eksCluster.certificateAuthority.data"),
    )?;

    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use crate::{api::StackInput, aws::tests::EKS_INPUT, outputs};

    #[test]
    fn cluster_sizing_and_oidc() {
        let stack = crate::plan(&StackInput::from_yaml(EKS_INPUT).unwrap()).unwrap();
        let cluster = stack.resource("cluster").unwrap();

        assert_eq!(cluster.r#type, "eks:Cluster");
        assert_eq!(cluster.properties["instanceType"], "t3.medium");
        assert_eq!(cluster.properties["desiredCapacity"], 2);
        assert_eq!(cluster.properties["minSize"], 1);
        assert_eq!(cluster.properties["maxSize"], 3);
        assert_eq!(cluster.properties["storageClasses"], "gp2");
        assert_eq!(cluster.properties["createOidcProvider"], true);
        assert_eq!(cluster.options.dependencies(), ["vpc"]);
        assert_eq!(cluster.options.provider_name(), Some("aws-provider"));

        assert_eq!(
            stack.outputs()[outputs::CLUSTER_CA_DATA],
            "${cluster.eksCluster.certificateAuthority.data}"
        );
    }
}
