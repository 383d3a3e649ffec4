use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    stack::{ResourceRef, Stack},
};

use super::{
    AddonContext,
    helm::{self, Release},
};

pub const INGRESS_NGINX_NAMESPACE: &str = "ingress-nginx";
pub const TRAEFIK_NAMESPACE: &str = "traefik";

/// ingress-nginx behind a cloud load balancer, registered as the default ingress class.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn ingress_nginx(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, INGRESS_NGINX_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("ingress-nginx-release", &helm::INGRESS_NGINX, &namespace).values(json!({
            "controller": {
                "service": { "type": "LoadBalancer" },
                "ingressClassResource": { "default": true },
                "config": { "use-forwarded-headers": "true" },
            },
        })),
    )
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn traefik(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, TRAEFIK_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("traefik-release", &helm::TRAEFIK, &namespace).values(json!({
            "service": { "type": "LoadBalancer" },
            "ingressClass": { "enabled": true, "isDefaultClass": false },
        })),
    )
}
