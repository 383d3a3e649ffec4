use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    outputs,
    stack::{ResourceRef, Stack},
    vars,
};

use super::{
    AddonContext, WorkloadIdentity,
    helm::{self, Release},
    identity::{self, IdentityRequest},
    manifest,
};

pub const NAMESPACE: &str = "external-secrets";
const SERVICE_ACCOUNT: &str = "external-secrets";
const METRICS_PORT: u16 = 3001;

/// `external-secrets.io/v1beta1` ClusterSecretStore
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "external-secrets.io",
    version = "v1beta1",
    kind = "ClusterSecretStore",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretStoreSpec {
    pub provider: SecretStoreProvider,
    /// Seconds between checks of the store's health.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SecretStoreProvider {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcpsm: Option<GcpSecretManagerProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsSecretsManagerProvider>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GcpSecretManagerProvider {
    #[serde(rename = "projectID")]
    pub project_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AwsSecretsManagerProvider {
    pub service: String,
    pub region: String,
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, NAMESPACE)?;

    let identity = identity::resources(
        stack,
        context,
        &IdentityRequest {
            name: SERVICE_ACCOUNT,
            namespace: NAMESPACE,
            description: "external-secrets service account for reading secrets",
            gcp_roles: &["roles/secretmanager.secretAccessor"],
            aws_policy_arns: &["arn:aws:iam::aws:policy/SecretsManagerReadWrite"],
            gcp_output_key: outputs::EXTERNAL_SECRETS_GSA_EMAIL,
            aws_output_key: outputs::EXTERNAL_SECRETS_IAM_ROLE_ARN,
        },
    )?;

    let service_account =
        super::service_account(stack, context, &namespace, SERVICE_ACCOUNT, &identity)?;

    let polling_interval_ms = vars::EXTERNAL_SECRETS_POLLING_INTERVAL_SECONDS * 1000;
    let release = helm::release(
        stack,
        context,
        Release::new("external-secrets-release", &helm::EXTERNAL_SECRETS, &namespace)
            .values(json!({
                "installCRDs": true,
                "replicaCount": 1,
                "rbac": { "create": true },
                "serviceAccount": { "create": false, "name": SERVICE_ACCOUNT },
                "env": {
                    "POLLER_INTERVAL_MILLISECONDS": polling_interval_ms.to_string(),
                    "LOG_LEVEL": "info",
                    "LOG_MESSAGE_KEY": "msg",
                    "METRICS_PORT": METRICS_PORT.to_string(),
                },
            }))
            .atomic(false)
            .depends_on(&service_account),
    )?;

    let store = cluster_secret_store(context);
    manifest::objects(
        stack,
        context,
        "external-secrets-cluster-secret-store",
        &[store],
        &release,
        &[],
    )?;

    Ok(release)
}

/// Store backed by the cloud's secret manager in the cluster's own project or region.
fn cluster_secret_store(context: &AddonContext) -> ClusterSecretStore {
    let (name, provider) = match &context.identity {
        WorkloadIdentity::Gcp { project_id, .. } => (
            "gcp-secrets-manager",
            SecretStoreProvider {
                gcpsm: Some(GcpSecretManagerProvider {
                    project_id: project_id.clone(),
                }),
                ..Default::default()
            },
        ),
        WorkloadIdentity::Aws { region, .. } => (
            "aws-secrets-manager",
            SecretStoreProvider {
                aws: Some(AwsSecretsManagerProvider {
                    service: "SecretsManager".to_string(),
                    region: region.clone(),
                }),
                ..Default::default()
            },
        ),
    };

    let mut store = ClusterSecretStore::new(
        name,
        ClusterSecretStoreSpec {
            provider,
            refresh_interval: Some(vars::EXTERNAL_SECRETS_POLLING_INTERVAL_SECONDS),
        },
    );
    store.metadata.labels = Some(context.labels.clone());
    store
}
