//! Data-platform operators and utility controllers. Each is a single chart in its own
//! namespace.

use serde_json::json;
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

pub const STRIMZI_NAMESPACE: &str = "strimzi-operator";
pub const POSTGRES_OPERATOR_NAMESPACE: &str = "postgres-operator";
pub const SOLR_OPERATOR_NAMESPACE: &str = "solr-operator";
pub const REFLECTOR_NAMESPACE: &str = "reflector";

/// CRDs the solr-operator chart does not ship, published per operator release.
fn solr_operator_crds_url() -> String {
    format!(
        "https://solr.apache.org/operator/downloads/crds/v{}/all-with-dependencies.yaml",
        helm::SOLR_OPERATOR.version
    )
}

/// Kafka operator watching every namespace.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn strimzi(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, STRIMZI_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("strimzi-release", &helm::STRIMZI, &namespace)
            .values(json!({ "watchAnyNamespace": true })),
    )
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn postgres_operator(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, POSTGRES_OPERATOR_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("postgres-operator-release", &helm::POSTGRES_OPERATOR, &namespace)
            .values(json!({
                "configKubernetes": { "enable_pod_antiaffinity": true },
            })),
    )
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn solr_operator(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, SOLR_OPERATOR_NAMESPACE)?;

    let crds_url = solr_operator_crds_url();
    let crds = manifest::files(
        stack,
        context,
        "solr-operator-crds",
        &[crds_url.as_str()],
        &namespace,
    )?;

    helm::release(
        stack,
        context,
        Release::new("solr-operator-release", &helm::SOLR_OPERATOR, &namespace)
            .values(json!({ "zookeeper-operator": { "install": true } }))
            .depends_on(&crds),
    )
}

/// Mirrors annotated secrets and config maps across namespaces.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn reflector(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, REFLECTOR_NAMESPACE)?;

    helm::release(
        stack,
        context,
        Release::new("reflector-release", &helm::REFLECTOR, &namespace),
    )
}
