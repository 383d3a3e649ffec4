use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result,
    stack::{ResourceRef, Stack},
};

use super::{
    AddonContext,
    helm::{self, Release},
    manifest,
};

pub const SYSTEM_NAMESPACE: &str = "istio-system";
pub const INGRESS_NAMESPACE: &str = "istio-ingress";

/// Label the gateway chart puts on its pods for a release named `istio-ingress`.
const INGRESS_GATEWAY_SELECTOR: (&str, &str) = ("istio", "ingress");

/// `networking.istio.io/v1alpha3` EnvoyFilter
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "EnvoyFilter",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilterSpec {
    pub workload_selector: WorkloadSelector,
    pub config_patches: Vec<Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WorkloadSelector {
    pub labels: BTreeMap<String, String>,
}

/// Base CRDs and istiod in `istio-system`, then an ingress gateway in its own namespace.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let system = super::namespace(stack, context, SYSTEM_NAMESPACE)?;

    let base = helm::release(
        stack,
        context,
        Release::new("istio-base-release", &helm::ISTIO_BASE, &system)
            .values(json!({ "defaultRevision": "default" })),
    )?;

    let istiod = helm::release(
        stack,
        context,
        Release::new("istiod-release", &helm::ISTIOD, &system)
            .values(json!({
                "meshConfig": {
                    "accessLogFile": "/dev/stdout",
                    "enableTracing": false,
                },
                "pilot": { "autoscaleMin": 1 },
            }))
            .depends_on(&base),
    )?;

    let ingress = super::namespace(stack, context, INGRESS_NAMESPACE)?;

    let gateway = helm::release(
        stack,
        context,
        Release::new("istio-ingress-release", &helm::ISTIO_GATEWAY, &ingress)
            .values(json!({
                "service": { "type": "LoadBalancer" },
            }))
            .depends_on(&istiod),
    )?;

    manifest::objects(
        stack,
        context,
        "istio-ingress-envoy-filter",
        &[forwarded_headers_filter(context)],
        &gateway,
        &[],
    )?;

    Ok(istiod)
}

/// Make the ingress gateway trust one hop of `x-forwarded-for` so workloads see the
/// client address behind the cloud load balancer.
fn forwarded_headers_filter(context: &AddonContext) -> EnvoyFilter {
    let (key, value) = INGRESS_GATEWAY_SELECTOR;

    let mut filter = EnvoyFilter::new(
        "ingress-gateway-forwarded-headers",
        EnvoyFilterSpec {
            workload_selector: WorkloadSelector {
                labels: BTreeMap::from([(key.to_string(), value.to_string())]),
            },
            config_patches: vec![json!({
                "applyTo": "NETWORK_FILTER",
                "match": {
                    "context": "GATEWAY",
                    "listener": {
                        "filterChain": {
                            "filter": { "name": "envoy.filters.network.http_connection_manager" },
                        },
                    },
                },
                "patch": {
                    "operation": "MERGE",
                    "value": {
                        "typed_config": {
                            "@type": "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager",
                            "use_remote_address": true,
                            "xff_num_trusted_hops": 1,
                        },
                    },
                },
            })],
        },
    );
    filter.metadata.namespace = Some(INGRESS_NAMESPACE.to_string());
    filter.metadata.labels = Some(context.labels.clone());
    filter
}

#[cfg(test)]
mod tests {
    use crate::addons::tests::gke_input_with;

    #[test]
    fn control_plane_then_gateway_then_filter() {
        let stack = crate::plan(&gke_input_with(&["isInstallIstio"])).unwrap();

        let istiod = stack.resource("istiod-release").unwrap();
        assert_eq!(istiod.options.dependencies(), ["istio-base-release"]);
        assert_eq!(istiod.properties["namespace"], "${istio-system-namespace.metadata.name}");

        let gateway = stack.resource("istio-ingress-release").unwrap();
        assert_eq!(gateway.properties["chart"], "gateway");
        assert_eq!(gateway.options.dependencies(), ["istiod-release"]);

        let filter = &stack.resource("istio-ingress-envoy-filter").unwrap().properties["objs"][0];
        assert_eq!(filter["apiVersion"], "networking.istio.io/v1alpha3");
        assert_eq!(filter["metadata"]["namespace"], "istio-ingress");
        assert_eq!(filter["spec"]["workloadSelector"]["labels"]["istio"], "ingress");
    }
}
