use serde_json::{Value, json};
use tracing::{Level, instrument};

use crate::{
    Result,
    outputs,
    stack::{ResourceRef, Stack},
};

use super::{
    AddedAddons, Addon, AddonContext, WorkloadIdentity,
    helm::{self, Release},
    identity::{self, IdentityRequest},
};

pub const NAMESPACE: &str = "external-dns";
const SERVICE_ACCOUNT: &str = "external-dns";

const SOURCES: &[&str] = &["service", "ingress"];
/// Sources that watch istio custom resources. external-dns exits when their CRDs are missing.
const ISTIO_SOURCES: &[&str] = &["istio-gateway", "istio-virtualservice"];

/// external-dns publishing records for services and ingresses, and for istio gateways
/// when istio is installed before it.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    context: &AddonContext,
    installed: &AddedAddons,
) -> Result<ResourceRef> {
    let istio = installed.release(Addon::Istio);

    let namespace = super::namespace(stack, context, NAMESPACE)?;

    let identity = identity::resources(
        stack,
        context,
        &IdentityRequest {
            name: SERVICE_ACCOUNT,
            namespace: NAMESPACE,
            description: "external-dns service account for managing dns records",
            gcp_roles: &["roles/dns.admin"],
            aws_policy_arns: &["arn:aws:iam::aws:policy/AmazonRoute53FullAccess"],
            gcp_output_key: outputs::EXTERNAL_DNS_GSA_EMAIL,
            aws_output_key: outputs::EXTERNAL_DNS_IAM_ROLE_ARN,
        },
    )?;

    let service_account =
        super::service_account(stack, context, &namespace, SERVICE_ACCOUNT, &identity)?;

    let mut release = Release::new("external-dns-release", &helm::EXTERNAL_DNS, &namespace)
        .values(values(context, istio.is_some()))
        .depends_on(&service_account);
    if let Some(istio) = istio {
        release = release.depends_on(istio);
    }

    helm::release(stack, context, release)
}

fn values(context: &AddonContext, with_istio: bool) -> Value {
    let sources: Vec<&str> = if with_istio {
        SOURCES.iter().chain(ISTIO_SOURCES).copied().collect()
    } else {
        SOURCES.to_vec()
    };

    let mut values = json!({
        "serviceAccount": { "create": false, "name": SERVICE_ACCOUNT },
        "policy": "sync",
        "sources": sources,
        "domainFilters": context.domain_filters,
        "txtOwnerId": context.cluster_name,
    });

    match &context.identity {
        WorkloadIdentity::Gcp { project_id, .. } => {
            values["provider"] = json!({ "name": "google" });
            values["extraArgs"] = json!([format!("--google-project={project_id}")]);
        }
        WorkloadIdentity::Aws { region, .. } => {
            values["provider"] = json!({ "name": "aws" });
            values["env"] = json!([{ "name": "AWS_DEFAULT_REGION", "value": region }]);
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::addons::tests::gke_input_with;

    #[test]
    fn google_provider_is_scoped_to_cluster_project_and_domains() {
        let mut input = gke_input_with(&["isInstallExternalDns"]);
        if let crate::api::StackInput::Gcp(gke) = &mut input {
            gke.target.spec.kubernetes_addons.external_dns_domain_filters =
                vec!["example.com".to_string()];
        }
        let stack = crate::plan(&input).unwrap();

        let values = &stack.resource("external-dns-release").unwrap().properties["values"];
        assert_eq!(values["provider"]["name"], "google");
        assert_eq!(
            values["extraArgs"][0],
            "--google-project=${cluster-project.projectId}"
        );
        assert_eq!(values["domainFilters"][0], "example.com");
        assert_eq!(values["txtOwnerId"], "demo");
        assert!(stack.resource("external-dns-gsa").is_some());
    }

    #[test]
    fn istio_sources_only_when_istio_is_installed() {
        let stack = crate::plan(&gke_input_with(&["isInstallExternalDns"])).unwrap();
        let release = stack.resource("external-dns-release").unwrap();
        assert_eq!(release.properties["values"]["sources"], json!(["service", "ingress"]));
        assert_eq!(release.options.dependencies(), ["external-dns-ksa"]);
    }

    #[test]
    fn istio_sources_wait_for_istio_crds() {
        let stack =
            crate::plan(&gke_input_with(&["isInstallExternalDns", "isInstallIstio"])).unwrap();
        let release = stack.resource("external-dns-release").unwrap();
        assert_eq!(
            release.properties["values"]["sources"],
            json!(["service", "ingress", "istio-gateway", "istio-virtualservice"])
        );
        assert_eq!(
            release.options.dependencies(),
            ["external-dns-ksa", "istiod-release"]
        );
    }
}
