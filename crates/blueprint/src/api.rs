use std::collections::BTreeSet;

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest cluster name that keeps `kc-<name>-c<suffix>` within the 30 character
/// project-id limit.
pub const MAX_CLUSTER_NAME_LEN: usize = 23;

/// Top-level document handed to the blueprint by the stack runner.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StackInput {
    Gcp(GkeClusterStackInput),
    Aws(EksClusterStackInput),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GkeClusterStackInput {
    pub gcp_credential: GcpCredential,
    pub target: GkeCluster,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EksClusterStackInput {
    pub aws_credential: AwsCredential,
    pub target: EksCluster,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredential {
    #[garde(length(min = 1))]
    pub service_account_key_base64: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredential {
    #[garde(length(min = 1))]
    pub access_key_id: String,
    #[garde(length(min = 1))]
    pub secret_access_key: String,
    #[garde(length(min = 1))]
    pub region: String,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Validate, JsonSchema)]
#[kube(group = "code2cloud.planton.cloud", version = "v1", kind = "GkeCluster")]
#[serde(rename_all = "camelCase")]
pub struct GkeClusterSpec {
    #[garde(length(min = 1))]
    pub billing_account_id: String,
    /// `organizations/<id>` or `folders/<id>`
    #[garde(length(min = 1))]
    pub folder_parent: String,
    #[garde(length(min = 1))]
    pub region: String,
    #[garde(length(min = 1))]
    pub zone: String,
    #[garde(skip)]
    #[serde(default)]
    pub is_create_shared_vpc: bool,
    #[garde(dive)]
    #[serde(default)]
    pub cluster_autoscaling_config: Option<ClusterAutoscalingConfig>,
    #[garde(length(min = 1), dive)]
    pub node_pools: Vec<NodePool>,
    #[garde(dive)]
    #[serde(default, deserialize_with = "null_as_default")]
    #[schemars(with = "KubernetesAddons")]
    pub kubernetes_addons: KubernetesAddons,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Validate, JsonSchema)]
#[kube(group = "code2cloud.planton.cloud", version = "v1", kind = "EksCluster")]
#[serde(rename_all = "camelCase")]
pub struct EksClusterSpec {
    #[garde(length(min = 1))]
    pub region: String,
    #[garde(length(min = 1))]
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[garde(range(min = 1))]
    pub desired_capacity: u32,
    #[garde(range(min = 1))]
    pub min_size: u32,
    #[garde(range(min = 1))]
    pub max_size: u32,
    #[garde(dive)]
    #[serde(default)]
    pub existing_vpc: Option<ExistingVpc>,
    #[garde(dive)]
    #[serde(default, deserialize_with = "null_as_default")]
    #[schemars(with = "KubernetesAddons")]
    pub kubernetes_addons: KubernetesAddons,
}

/// An empty YAML section reads as null; treat it like a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_instance_type() -> String {
    "t3.medium".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExistingVpc {
    #[garde(length(min = 1))]
    pub vpc_id: String,
    #[garde(length(min = 1))]
    pub public_subnet_ids: Vec<String>,
    #[garde(length(min = 1))]
    pub private_subnet_ids: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAutoscalingConfig {
    #[garde(skip)]
    pub is_enabled: bool,
    #[garde(skip)]
    pub cpu_min_cores: u32,
    #[garde(range(min = 1))]
    pub cpu_max_cores: u32,
    #[garde(skip)]
    pub memory_min_gb: u32,
    #[garde(range(min = 1))]
    pub memory_max_gb: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    #[garde(length(min = 1, max = 30))]
    pub name: String,
    #[garde(length(min = 1))]
    pub machine_type: String,
    #[garde(skip)]
    pub min_node_count: u32,
    #[garde(range(min = 1))]
    pub max_node_count: u32,
    #[garde(skip)]
    #[serde(default)]
    pub is_spot_enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, Validate, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesAddons {
    #[garde(skip)]
    pub is_install_cert_manager: bool,
    #[garde(skip)]
    pub is_install_external_dns: bool,
    #[garde(skip)]
    pub is_install_external_secrets: bool,
    #[garde(skip)]
    pub is_install_istio: bool,
    #[garde(skip)]
    pub is_install_ingress_nginx: bool,
    #[garde(skip)]
    pub is_install_linkerd: bool,
    #[garde(skip)]
    pub is_install_traefik: bool,
    #[garde(skip)]
    pub is_install_prometheus: bool,
    #[garde(skip)]
    pub is_install_opencost: bool,
    #[garde(skip)]
    pub is_install_strimzi: bool,
    #[garde(skip)]
    pub is_install_postgres_operator: bool,
    #[garde(skip)]
    pub is_install_solr_operator: bool,
    #[garde(skip)]
    pub is_install_reflector: bool,
    #[garde(inner(length(min = 1)))]
    pub external_dns_domain_filters: Vec<String>,
}

impl KubernetesAddons {
    fn check(&self) -> Result<()> {
        if self.is_install_linkerd && !self.is_install_cert_manager {
            return Err(Error::InvalidInput(
                "linkerd requires cert-manager to issue its identity certificates".to_string(),
            ));
        }
        if self.is_install_opencost && !self.is_install_prometheus {
            return Err(Error::InvalidInput(
                "opencost requires prometheus as its metrics source".to_string(),
            ));
        }
        Ok(())
    }
}

impl StackInput {
    /// Parse and validate a YAML (or JSON) stack input.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let input: Self = serde_yaml_ng::from_str(data)?;
        input.check()?;
        Ok(input)
    }

    pub fn check(&self) -> Result<()> {
        match self {
            Self::Gcp(gke) => {
                gke.gcp_credential.validate()?;
                let spec = &gke.target.spec;
                spec.validate()?;
                check_cluster_name(gke.target.metadata.name.as_deref())?;

                if !(spec.folder_parent.starts_with("organizations/")
                    || spec.folder_parent.starts_with("folders/"))
                {
                    return Err(Error::InvalidInput(format!(
                        "folder parent {} must be organizations/<id> or folders/<id>",
                        spec.folder_parent
                    )));
                }
                if !spec.zone.starts_with(&format!("{}-", spec.region)) {
                    return Err(Error::InvalidInput(format!(
                        "zone {} is not in region {}",
                        spec.zone, spec.region
                    )));
                }
                if let Some(autoscaling) = &spec.cluster_autoscaling_config {
                    if autoscaling.cpu_min_cores > autoscaling.cpu_max_cores
                        || autoscaling.memory_min_gb > autoscaling.memory_max_gb
                    {
                        return Err(Error::InvalidInput(
                            "cluster autoscaling minimums exceed maximums".to_string(),
                        ));
                    }
                }

                let mut seen = BTreeSet::new();
                for pool in &spec.node_pools {
                    if !is_dns_label(&pool.name) {
                        return Err(Error::InvalidInput(format!(
                            "node pool name {} must be a lowercase DNS label",
                            pool.name
                        )));
                    }
                    if !seen.insert(pool.name.as_str()) {
                        return Err(Error::InvalidInput(format!(
                            "node pool {} is declared more than once",
                            pool.name
                        )));
                    }
                    if pool.min_node_count > pool.max_node_count {
                        return Err(Error::InvalidInput(format!(
                            "node pool {} has min node count above max node count",
                            pool.name
                        )));
                    }
                }

                spec.kubernetes_addons.check()
            }
            Self::Aws(eks) => {
                eks.aws_credential.validate()?;
                let spec = &eks.target.spec;
                spec.validate()?;
                check_cluster_name(eks.target.metadata.name.as_deref())?;

                if !(spec.min_size <= spec.desired_capacity && spec.desired_capacity <= spec.max_size)
                {
                    return Err(Error::InvalidInput(format!(
                        "desired capacity {} must be within [{}, {}]",
                        spec.desired_capacity, spec.min_size, spec.max_size
                    )));
                }

                spec.kubernetes_addons.check()
            }
        }
    }

    pub fn cluster_name(&self) -> Result<&str> {
        let name = match self {
            Self::Gcp(gke) => gke.target.metadata.name.as_deref(),
            Self::Aws(eks) => eks.target.metadata.name.as_deref(),
        };
        name.ok_or(Error::MissingField("name"))
    }

    pub fn program_name(&self) -> Result<String> {
        let kind = match self {
            Self::Gcp(_) => "gke",
            Self::Aws(_) => "eks",
        };
        Ok(format!("{kind}-cluster-{}", self.cluster_name()?))
    }

    pub fn addons(&self) -> &KubernetesAddons {
        match self {
            Self::Gcp(gke) => &gke.target.spec.kubernetes_addons,
            Self::Aws(eks) => &eks.target.spec.kubernetes_addons,
        }
    }
}

fn check_cluster_name(name: Option<&str>) -> Result<()> {
    let name = name.ok_or(Error::MissingField("name"))?;
    if !is_dns_label(name) || name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "cluster name {name} must be a lowercase DNS label of at most {MAX_CLUSTER_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.starts_with(|c: char| c.is_ascii_lowercase())
        && !s.ends_with('-')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
