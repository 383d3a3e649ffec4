//! Fixed values baked into every cluster stack.

/// Prefix of every folder and project id created by the blueprint.
pub const PROJECT_PREFIX: &str = "kc";

/// Length of the random suffixes appended to project ids and the cluster name.
/// Anything longer risks exceeding the 30 character project-id limit.
pub const RANDOM_SUFFIX_LENGTH: u32 = 2;

pub const CLUSTER_PROJECT_APIS: &[&str] = &[
    "compute.googleapis.com",
    "container.googleapis.com",
    "secretmanager.googleapis.com",
    "dns.googleapis.com",
];

pub const NETWORK_PROJECT_APIS: &[&str] = &[
    "compute.googleapis.com",
    "container.googleapis.com",
    "dns.googleapis.com",
];

/// Block carved into the node, pod and service ranges of the subnetwork.
pub const CLUSTER_CIDR_BLOCK: &str = "10.0.0.0/14";

/// Block of the VPC created for EKS clusters without an existing VPC.
pub const AWS_VPC_CIDR_BLOCK: &str = "10.0.0.0/16";

/// Control plane range for private clusters; GKE requires a /28.
pub const API_SERVER_IP_CIDR: &str = "172.16.0.0/28";
pub const MASTER_AUTHORIZED_NETWORKS_CIDR_BLOCK: &str = "0.0.0.0/0";
pub const MASTER_AUTHORIZED_NETWORKS_DESCRIPTION: &str = "kubectl-from-anywhere";
pub const API_SERVER_WEBHOOK_PORT: &str = "8443";
pub const ISTIO_PILOT_WEBHOOK_PORT: &str = "15017";

pub const GKE_RELEASE_CHANNEL: &str = "REGULAR";
pub const GKE_LOGGING_COMPONENTS: &[&str] = &["SYSTEM_COMPONENTS", "WORKLOADS"];

pub const NODE_POOL_OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/monitoring",
    "https://www.googleapis.com/auth/monitoring.write",
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/logging.write",
];

/// Service account used by downstream stacks to deploy workloads to the cluster.
pub const WORKLOAD_DEPLOYER_SERVICE_ACCOUNT: &str = "workload-deployer";

pub const GKE_WORKLOAD_IDENTITY_ANNOTATION: &str = "iam.gke.io/gcp-service-account";
pub const EKS_WORKLOAD_IDENTITY_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

pub const MANAGED_BY: &str = "kube-cluster-blueprint";

/// Helm release timeout in seconds.
pub const HELM_TIMEOUT_SECONDS: u32 = 180;

/// Polling interval of external-secrets. Shorter intervals cost more API calls.
pub const EXTERNAL_SECRETS_POLLING_INTERVAL_SECONDS: u32 = 10;

/// Storage class created by the EKS cluster component and marked default.
pub const EKS_STORAGE_CLASS: &str = "gp2";
