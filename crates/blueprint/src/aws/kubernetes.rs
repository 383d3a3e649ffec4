use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result,
    api::AwsCredential,
    stack::{ResourceOptions, ResourceRef, Stack},
};

pub const KUBERNETES_PROVIDER: &str = "kubernetes-provider";

/// Kubernetes provider for the EKS cluster. Tokens are minted by `aws eks get-token` with
/// the stack's access key pair in its environment, so the host's own AWS login is unused.
#[instrument(level = Level::DEBUG, skip(stack, credential, cluster))]
pub fn provider(
    stack: &mut Stack,
    credential: &AwsCredential,
    region: &str,
    cluster: &ResourceRef,
) -> Result<ResourceRef> {
    stack.declare(
        KUBERNETES_PROVIDER,
        "pulumi:providers:kubernetes",
        json!({
            "kubeconfig": { "fn::secret": { "fn::toJSON": kubeconfig(credential, region, cluster) } },
            "enableServerSideApply": true,
        }),
        ResourceOptions::new().depends_on([cluster]),
    )
}

fn kubeconfig(credential: &AwsCredential, region: &str, cluster: &ResourceRef) -> Value {
    let context = cluster.name();
    json!({
        "apiVersion": "v1",
        "kind": "Config",
        "current-context": context,
        "clusters": [{
            "name": context,
            "cluster": {
                "server": cluster.output("eksCluster.endpoint"),
                "certificate-authority-data": cluster.output("eksCluster.certificateAuthority.data"),
            },
        }],
        "contexts": [{
            "name": context,
            "context": { "cluster": context, "user": context },
        }],
        "users": [{
            "name": context,
            "user": {
                "exec": {
                    "apiVersion": "client.authentication.k8s.io/v1beta1",
                    "command": "aws",
                    "args": [
                        "eks",
                        "get-token",
                        "--cluster-name",
                        cluster.output("eksCluster.name"),
                        "--region",
                        region,
                    ],
                    "env": [
                        { "name": "AWS_ACCESS_KEY_ID", "value": credential.access_key_id },
                        { "name": "AWS_SECRET_ACCESS_KEY", "value": credential.secret_access_key },
                    ],
                },
            },
        }],
    })
}
