use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result,
    stack::{ResourceOptions, ResourceRef, Stack},
};

use super::cluster::AddedCluster;

pub const KUBERNETES_PROVIDER: &str = "kubernetes-provider";

/// Kubernetes provider pointed at the new cluster. It waits for the node pools so that
/// add-ons are never scheduled onto a cluster without nodes.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn provider(
    stack: &mut Stack,
    gcp_provider: &ResourceRef,
    cluster: &AddedCluster,
    node_pools: &[ResourceRef],
) -> Result<ResourceRef> {
    stack.declare(
        KUBERNETES_PROVIDER,
        "pulumi:providers:kubernetes",
        json!({
            "kubeconfig": { "fn::secret": { "fn::toJSON": kubeconfig(gcp_provider, &cluster.cluster) } },
            "enableServerSideApply": true,
        }),
        ResourceOptions::new().depends_on(node_pools),
    )
}

/// Kubeconfig for the cluster. The bearer token is an access token of the stack's own
/// service account, obtained through the gcp provider rather than a local gcloud login.
fn kubeconfig(gcp_provider: &ResourceRef, cluster: &ResourceRef) -> Value {
    let context = cluster.name();
    json!({
        "apiVersion": "v1",
        "kind": "Config",
        "current-context": context,
        "clusters": [{
            "name": context,
            "cluster": {
                "server": format!("https://{}", cluster.output("endpoint")),
                "certificate-authority-data": cluster.output("masterAuth.clusterCaCertificate"),
            },
        }],
        "contexts": [{
            "name": context,
            "context": { "cluster": context, "user": context },
        }],
        "users": [{
            "name": context,
            "user": {
                "token": {
                    "fn::invoke": {
                        "function": "gcp:organizations:getClientConfig",
                        "arguments": {},
                        "options": { "provider": gcp_provider.handle() },
                        "return": "accessToken",
                    },
                },
            },
        }],
    })
}

#[cfg(test)]
mod tests {
    use crate::api::{StackInput, tests::GKE_INPUT};

    use super::KUBERNETES_PROVIDER;

    #[test]
    fn kubeconfig_points_at_cluster_and_waits_for_node_pools() {
        let stack = crate::plan(&StackInput::from_yaml(GKE_INPUT).unwrap()).unwrap();
        let provider = stack.resource(KUBERNETES_PROVIDER).unwrap();

        let kubeconfig = &provider.properties["kubeconfig"]["fn::secret"]["fn::toJSON"];
        assert_eq!(kubeconfig["current-context"], "cluster");
        let cluster = &kubeconfig["clusters"][0]["cluster"];
        assert_eq!(cluster["server"], "https://${cluster.endpoint}");
        assert_eq!(
            cluster["certificate-authority-data"],
            "${cluster.masterAuth.clusterCaCertificate}"
        );

        assert_eq!(provider.options.dependencies(), ["node-pool-general"]);
    }

    #[test]
    fn token_comes_from_the_stack_credential() {
        let stack = crate::plan(&StackInput::from_yaml(GKE_INPUT).unwrap()).unwrap();
        let provider = stack.resource(KUBERNETES_PROVIDER).unwrap();

        let user = &provider.properties["kubeconfig"]["fn::secret"]["fn::toJSON"]["users"][0]["user"];
        assert!(user.get("exec").is_none());
        let invoke = &user["token"]["fn::invoke"];
        assert_eq!(invoke["function"], "gcp:organizations:getClientConfig");
        assert_eq!(invoke["options"]["provider"], "${gcp-provider}");
        assert_eq!(invoke["return"], "accessToken");
    }
}
