use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result,
    api::EksClusterSpec,
    locals::Locals,
    outputs,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

/// Where the cluster's subnets come from. Values are literals for an existing VPC and
/// interpolations for a created one.
#[derive(Debug, Clone)]
pub struct AddedNetwork {
    pub vpc: Option<ResourceRef>,
    pub vpc_id: Value,
    pub public_subnet_ids: Value,
    pub private_subnet_ids: Value,
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    locals: &Locals,
    spec: &EksClusterSpec,
    provider: &ResourceRef,
) -> Result<AddedNetwork> {
    let network = match &spec.existing_vpc {
        Some(existing) => {
            tracing::info!(vpc = %existing.vpc_id, "using existing vpc");
            AddedNetwork {
                vpc: None,
                vpc_id: json!(existing.vpc_id),
                public_subnet_ids: json!(existing.public_subnet_ids),
                private_subnet_ids: json!(existing.private_subnet_ids),
            }
        }
        None => {
            let vpc = stack.declare(
                "vpc",
                "awsx:ec2:Vpc",
                json!({
                    "cidrBlock": vars::AWS_VPC_CIDR_BLOCK,
                    "enableDnsHostnames": true,
                    "natGateways": { "strategy": "Single" },
                    "tags": locals.cloud_labels,
                }),
                ResourceOptions::new().provider(provider),
            )?;
            AddedNetwork {
                vpc_id: json!(vpc.output("vpcId")),
                public_subnet_ids: json!(vpc.output("publicSubnetIds")),
                private_subnet_ids: json!(vpc.output("privateSubnetIds")),
                vpc: Some(vpc),
            }
        }
    };

    stack.export(outputs::CLUSTER_VPC_ID, network.vpc_id.clone())?;

    Ok(network)
}
