//! Stack output keys, and the reader that turns an engine's output map back into typed
//! structs for downstream consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

pub const FOLDER_ID: &str = "folder-id";
pub const FOLDER_DISPLAY_NAME: &str = "folder-name";
pub const FOLDER_PARENT: &str = "folder-parent";
pub const CLUSTER_PROJECT_ID: &str = "container-cluster-project-id";
pub const CLUSTER_PROJECT_NUMBER: &str = "container-cluster-project-number";
pub const VPC_NETWORK_PROJECT_ID: &str = "vpc-network-project-id";
pub const VPC_NETWORK_PROJECT_NUMBER: &str = "vpc-network-project-number";
pub const NETWORK_SELF_LINK: &str = "network-self-link";
pub const SUB_NETWORK_SELF_LINK: &str = "sub-network-self-link";
pub const GKE_WEBHOOKS_FIREWALL_SELF_LINK: &str = "gke-webhooks-firewall-self-link";
pub const ROUTER_SELF_LINK: &str = "router-self-link";
pub const NAT_IP_ADDRESS: &str = "nat-ip-address";
pub const ROUTER_NAT_NAME: &str = "router-nat-name";
pub const CLUSTER_NAME: &str = "cluster-name";
pub const CLUSTER_ENDPOINT: &str = "cluster-endpoint";
pub const CLUSTER_CA_DATA: &str = "cluster-ca-data";
pub const WORKLOAD_DEPLOYER_GSA_EMAIL: &str = "workload-deployer-gsa-email";
pub const WORKLOAD_DEPLOYER_GSA_KEY: &str = "workload-deployer-gsa-key";
pub const CERT_MANAGER_GSA_EMAIL: &str = "cert-manager-gsa-email";
pub const EXTERNAL_DNS_GSA_EMAIL: &str = "external-dns-gsa-email";
pub const EXTERNAL_SECRETS_GSA_EMAIL: &str = "external-secrets-gsa-email";

pub const CLUSTER_VPC_ID: &str = "cluster-vpc-id";
pub const KUBECONFIG: &str = "kubeconfig";
pub const CERT_MANAGER_IAM_ROLE_ARN: &str = "cert-manager-iam-role-arn";
pub const EXTERNAL_DNS_IAM_ROLE_ARN: &str = "external-dns-iam-role-arn";
pub const EXTERNAL_SECRETS_IAM_ROLE_ARN: &str = "external-secrets-iam-role-arn";

/// Every fixed key. Node pool keys are derived per pool, see [`node_pool_key`].
pub const ALL_KEYS: &[&str] = &[
    FOLDER_ID,
    FOLDER_DISPLAY_NAME,
    FOLDER_PARENT,
    CLUSTER_PROJECT_ID,
    CLUSTER_PROJECT_NUMBER,
    VPC_NETWORK_PROJECT_ID,
    VPC_NETWORK_PROJECT_NUMBER,
    NETWORK_SELF_LINK,
    SUB_NETWORK_SELF_LINK,
    GKE_WEBHOOKS_FIREWALL_SELF_LINK,
    ROUTER_SELF_LINK,
    NAT_IP_ADDRESS,
    ROUTER_NAT_NAME,
    CLUSTER_NAME,
    CLUSTER_ENDPOINT,
    CLUSTER_CA_DATA,
    WORKLOAD_DEPLOYER_GSA_EMAIL,
    WORKLOAD_DEPLOYER_GSA_KEY,
    CERT_MANAGER_GSA_EMAIL,
    EXTERNAL_DNS_GSA_EMAIL,
    EXTERNAL_SECRETS_GSA_EMAIL,
    CLUSTER_VPC_ID,
    KUBECONFIG,
    CERT_MANAGER_IAM_ROLE_ARN,
    EXTERNAL_DNS_IAM_ROLE_ARN,
    EXTERNAL_SECRETS_IAM_ROLE_ARN,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePoolAttribute {
    Name,
    MachineType,
    SpotInstances,
}

impl NodePoolAttribute {
    fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::MachineType => "machine-type",
            Self::SpotInstances => "spot-instances",
        }
    }
}

pub fn node_pool_key(pool: &str, attribute: NodePoolAttribute) -> String {
    format!("node-pool-{pool}-{}", attribute.as_str())
}

/// Flat output map as printed by `stack output --json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct StackOutputs(BTreeMap<String, Value>);

impl StackOutputs {
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Value of `key` as a string. Numbers and booleans are stringified.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl From<BTreeMap<String, Value>> for StackOutputs {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeStackOutputs {
    pub folder_id: Option<String>,
    pub cluster_project_id: Option<String>,
    pub cluster_project_number: Option<String>,
    pub network_project_id: Option<String>,
    pub network_project_number: Option<String>,
    pub network_self_link: Option<String>,
    pub sub_network_self_link: Option<String>,
    pub webhooks_firewall_self_link: Option<String>,
    pub router_self_link: Option<String>,
    pub router_nat_name: Option<String>,
    pub nat_ip_address: Option<String>,
    pub cluster_name: Option<String>,
    pub cluster_endpoint: Option<String>,
    pub cluster_ca_data: Option<String>,
    pub iam: IamOutputs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamOutputs {
    pub workload_deployer_gsa_email: Option<String>,
    pub workload_deployer_gsa_key_base64: Option<String>,
    pub cert_manager_gsa_email: Option<String>,
    pub external_dns_gsa_email: Option<String>,
    pub external_secrets_gsa_email: Option<String>,
}

impl GkeStackOutputs {
    pub fn read(outputs: &StackOutputs) -> Self {
        Self {
            folder_id: outputs.get(FOLDER_ID),
            cluster_project_id: outputs.get(CLUSTER_PROJECT_ID),
            cluster_project_number: outputs.get(CLUSTER_PROJECT_NUMBER),
            network_project_id: outputs.get(VPC_NETWORK_PROJECT_ID),
            network_project_number: outputs.get(VPC_NETWORK_PROJECT_NUMBER),
            network_self_link: outputs.get(NETWORK_SELF_LINK),
            sub_network_self_link: outputs.get(SUB_NETWORK_SELF_LINK),
            webhooks_firewall_self_link: outputs.get(GKE_WEBHOOKS_FIREWALL_SELF_LINK),
            router_self_link: outputs.get(ROUTER_SELF_LINK),
            router_nat_name: outputs.get(ROUTER_NAT_NAME),
            nat_ip_address: outputs.get(NAT_IP_ADDRESS),
            cluster_name: outputs.get(CLUSTER_NAME),
            cluster_endpoint: outputs.get(CLUSTER_ENDPOINT),
            cluster_ca_data: outputs.get(CLUSTER_CA_DATA),
            iam: IamOutputs {
                workload_deployer_gsa_email: outputs.get(WORKLOAD_DEPLOYER_GSA_EMAIL),
                workload_deployer_gsa_key_base64: outputs.get(WORKLOAD_DEPLOYER_GSA_KEY),
                cert_manager_gsa_email: outputs.get(CERT_MANAGER_GSA_EMAIL),
                external_dns_gsa_email: outputs.get(EXTERNAL_DNS_GSA_EMAIL),
                external_secrets_gsa_email: outputs.get(EXTERNAL_SECRETS_GSA_EMAIL),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EksStackOutputs {
    pub cluster_name: Option<String>,
    pub cluster_vpc_id: Option<String>,
    pub cluster_endpoint: Option<String>,
    pub cluster_ca_data: Option<String>,
    pub kubeconfig: Option<String>,
    pub cert_manager_iam_role_arn: Option<String>,
    pub external_dns_iam_role_arn: Option<String>,
    pub external_secrets_iam_role_arn: Option<String>,
}

impl EksStackOutputs {
    pub fn read(outputs: &StackOutputs) -> Self {
        Self {
            cluster_name: outputs.get(CLUSTER_NAME),
            cluster_vpc_id: outputs.get(CLUSTER_VPC_ID),
            cluster_endpoint: outputs.get(CLUSTER_ENDPOINT),
            cluster_ca_data: outputs.get(CLUSTER_CA_DATA),
            kubeconfig: outputs.get(KUBECONFIG),
            cert_manager_iam_role_arn: outputs.get(CERT_MANAGER_IAM_ROLE_ARN),
            external_dns_iam_role_arn: outputs.get(EXTERNAL_DNS_IAM_ROLE_ARN),
            external_secrets_iam_role_arn: outputs.get(EXTERNAL_SECRETS_IAM_ROLE_ARN),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolOutputs {
    pub pool: String,
    pub name: Option<String>,
    pub machine_type: Option<String>,
    pub spot_instances: Option<String>,
}

impl NodePoolOutputs {
    pub fn read(outputs: &StackOutputs, pool: &str) -> Self {
        Self {
            pool: pool.to_string(),
            name: outputs.get(&node_pool_key(pool, NodePoolAttribute::Name)),
            machine_type: outputs.get(&node_pool_key(pool, NodePoolAttribute::MachineType)),
            spot_instances: outputs.get(&node_pool_key(pool, NodePoolAttribute::SpotInstances)),
        }
    }
}
