use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Error, Result,
    stack::{ResourceRef, Stack},
};

use super::{
    AddedAddons, Addon, AddonContext,
    helm::{self, Release},
};

pub const PROMETHEUS_NAMESPACE: &str = "monitoring";
pub const OPENCOST_NAMESPACE: &str = "opencost";

/// Service the kube-prometheus-stack chart puts in front of prometheus.
const PROMETHEUS_SERVICE: &str = "kube-prometheus-stack-prometheus";
const PROMETHEUS_PORT: u16 = 9090;

#[instrument(level = Level::DEBUG, skip_all)]
pub fn prometheus(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, PROMETHEUS_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("prometheus-release", &helm::KUBE_PROMETHEUS_STACK, &namespace).values(
            json!({
                "prometheus": {
                    "prometheusSpec": {
                        "serviceMonitorSelectorNilUsesHelmValues": false,
                        "podMonitorSelectorNilUsesHelmValues": false,
                    },
                },
            }),
        ),
    )
}

/// opencost reading from the in-cluster prometheus.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn opencost(
    stack: &mut Stack,
    context: &AddonContext,
    installed: &AddedAddons,
) -> Result<ResourceRef> {
    let prometheus = installed.release(Addon::Prometheus).ok_or_else(|| {
        Error::InvalidInput("opencost requires prometheus to be installed first".to_string())
    })?;

    let namespace = super::namespace(stack, context, OPENCOST_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("opencost-release", &helm::OPENCOST, &namespace)
            .values(json!({
                "opencost": {
                    "prometheus": {
                        "internal": {
                            "enabled": true,
                            "serviceName": PROMETHEUS_SERVICE,
                            "namespaceName": PROMETHEUS_NAMESPACE,
                            "port": PROMETHEUS_PORT,
                        },
                    },
                },
            }))
            .depends_on(prometheus),
    )
}
