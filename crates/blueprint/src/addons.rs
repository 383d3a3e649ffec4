//! Cluster add-on installers.
//!
//! Every installer follows the same shape: a namespace, optionally a cloud identity bound
//! to a Kubernetes service account through workload identity, and one or more pinned Helm
//! releases. A few add-ons also apply raw custom resources once their chart is installed.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use kube::api::ObjectMeta;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    api::KubernetesAddons,
    stack::{ResourceOptions, ResourceRef, Stack},
};

pub mod cert_manager;
pub mod external_dns;
pub mod external_secrets;
pub mod helm;
pub mod identity;
pub mod ingress;
pub mod istio;
pub mod linkerd;
pub mod manifest;
pub mod monitoring;
pub mod operators;

/// Add-ons in installation order. Add-ons that depend on another one come after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Addon {
    CertManager,
    Istio,
    ExternalDns,
    ExternalSecrets,
    IngressNginx,
    Linkerd,
    Traefik,
    Prometheus,
    Opencost,
    Strimzi,
    PostgresOperator,
    SolrOperator,
    Reflector,
}

impl Addon {
    pub const ALL: [Addon; 13] = [
        Addon::CertManager,
        Addon::Istio,
        Addon::ExternalDns,
        Addon::ExternalSecrets,
        Addon::IngressNginx,
        Addon::Linkerd,
        Addon::Traefik,
        Addon::Prometheus,
        Addon::Opencost,
        Addon::Strimzi,
        Addon::PostgresOperator,
        Addon::SolrOperator,
        Addon::Reflector,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Addon::CertManager => "cert-manager",
            Addon::ExternalDns => "external-dns",
            Addon::ExternalSecrets => "external-secrets",
            Addon::Istio => "istio",
            Addon::IngressNginx => "ingress-nginx",
            Addon::Linkerd => "linkerd",
            Addon::Traefik => "traefik",
            Addon::Prometheus => "prometheus",
            Addon::Opencost => "opencost",
            Addon::Strimzi => "strimzi",
            Addon::PostgresOperator => "postgres-operator",
            Addon::SolrOperator => "solr-operator",
            Addon::Reflector => "reflector",
        }
    }

    pub fn is_enabled(self, toggles: &KubernetesAddons) -> bool {
        match self {
            Addon::CertManager => toggles.is_install_cert_manager,
            Addon::ExternalDns => toggles.is_install_external_dns,
            Addon::ExternalSecrets => toggles.is_install_external_secrets,
            Addon::Istio => toggles.is_install_istio,
            Addon::IngressNginx => toggles.is_install_ingress_nginx,
            Addon::Linkerd => toggles.is_install_linkerd,
            Addon::Traefik => toggles.is_install_traefik,
            Addon::Prometheus => toggles.is_install_prometheus,
            Addon::Opencost => toggles.is_install_opencost,
            Addon::Strimzi => toggles.is_install_strimzi,
            Addon::PostgresOperator => toggles.is_install_postgres_operator,
            Addon::SolrOperator => toggles.is_install_solr_operator,
            Addon::Reflector => toggles.is_install_reflector,
        }
    }

    fn install(
        self,
        stack: &mut Stack,
        context: &AddonContext,
        installed: &AddedAddons,
    ) -> Result<ResourceRef> {
        match self {
            Addon::CertManager => cert_manager::resources(stack, context),
            Addon::ExternalDns => external_dns::resources(stack, context, installed),
            Addon::ExternalSecrets => external_secrets::resources(stack, context),
            Addon::Istio => istio::resources(stack, context),
            Addon::IngressNginx => ingress::ingress_nginx(stack, context),
            Addon::Linkerd => linkerd::resources(stack, context, installed),
            Addon::Traefik => ingress::traefik(stack, context),
            Addon::Prometheus => monitoring::prometheus(stack, context),
            Addon::Opencost => monitoring::opencost(stack, context, installed),
            Addon::Strimzi => operators::strimzi(stack, context),
            Addon::PostgresOperator => operators::postgres_operator(stack, context),
            Addon::SolrOperator => operators::solr_operator(stack, context),
            Addon::Reflector => operators::reflector(stack, context),
        }
    }
}

pub fn enabled_addons(toggles: &KubernetesAddons) -> impl Iterator<Item = Addon> + '_ {
    Addon::ALL.into_iter().filter(|addon| addon.is_enabled(toggles))
}

/// Cloud side of workload identity: which provider creates the identities and how a
/// Kubernetes service account is allowed to assume them.
#[derive(Debug, Clone)]
pub enum WorkloadIdentity {
    Gcp {
        provider: ResourceRef,
        /// Cluster project id, usually an interpolation.
        project_id: String,
        cluster: ResourceRef,
    },
    Aws {
        provider: ResourceRef,
        region: String,
        /// ARN of the cluster's OIDC provider.
        oidc_provider_arn: String,
        /// OIDC issuer host and path, without the scheme.
        oidc_issuer: String,
        cluster: ResourceRef,
    },
}

/// Everything an installer needs from the cluster stack.
#[derive(Debug, Clone)]
pub struct AddonContext {
    pub cluster_name: String,
    pub kubernetes_provider: ResourceRef,
    pub identity: WorkloadIdentity,
    pub labels: BTreeMap<String, String>,
    pub domain_filters: Vec<String>,
}

impl AddonContext {
    /// Options shared by every Kubernetes resource of an add-on.
    pub fn kubernetes(&self) -> ResourceOptions {
        ResourceOptions::new().provider(&self.kubernetes_provider)
    }

    pub fn metadata(&self, name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            labels: Some(self.labels.clone()),
            ..Default::default()
        }
    }
}

/// Main release of every installed add-on.
#[derive(Debug, Default)]
pub struct AddedAddons {
    releases: BTreeMap<Addon, ResourceRef>,
}

impl AddedAddons {
    pub fn release(&self, addon: Addon) -> Option<&ResourceRef> {
        self.releases.get(&addon)
    }
}

/// Run every enabled installer in order.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    context: &AddonContext,
    toggles: &KubernetesAddons,
) -> Result<AddedAddons> {
    let mut added = AddedAddons::default();

    for addon in enabled_addons(toggles) {
        tracing::info!(addon = addon.name(), "adding addon");
        let release = addon
            .install(stack, context, &added)
            .wrap_err(format!("failed to install {}", addon.name()))?;
        added.releases.insert(addon, release);
    }

    Ok(added)
}

/// Declare the namespace `name` as resource `<name>-namespace`.
pub(crate) fn namespace(
    stack: &mut Stack,
    context: &AddonContext,
    name: &str,
) -> Result<ResourceRef> {
    let namespace = Namespace {
        metadata: context.metadata(name, None),
        ..Default::default()
    };

    stack
        .declare(
            &format!("{name}-namespace"),
            "kubernetes:core/v1:Namespace",
            serde_json::to_value(&namespace)?,
            context.kubernetes(),
        )
        .wrap_err(format!("failed to add {name} namespace"))
}

/// Service account annotated with the cloud identity it may impersonate.
pub(crate) fn service_account(
    stack: &mut Stack,
    context: &AddonContext,
    namespace: &ResourceRef,
    name: &str,
    identity: &identity::AddedIdentity,
) -> Result<ResourceRef> {
    let mut metadata = context.metadata(name, None);
    metadata.namespace = Some(namespace.output("metadata.name"));
    metadata.annotations = Some(BTreeMap::from([(
        identity.annotation_key.to_string(),
        identity.annotation_value.clone(),
    )]));

    let service_account = ServiceAccount {
        metadata,
        ..Default::default()
    };

    stack
        .declare(
            &format!("{name}-ksa"),
            "kubernetes:core/v1:ServiceAccount",
            serde_json::to_value(&service_account)?,
            context.kubernetes().parent(namespace),
        )
        .wrap_err(format!("failed to add {name} kubernetes service account"))
}

#[cfg(test)]
pub(crate) mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::{StackInput, tests::GKE_INPUT};

    /// Toggles for `addon` plus whatever it requires.
    pub(crate) fn toggles_for(addon: Addon) -> Vec<&'static str> {
        let toggle = |a: Addon| match a {
            Addon::CertManager => "isInstallCertManager",
            Addon::ExternalDns => "isInstallExternalDns",
            Addon::ExternalSecrets => "isInstallExternalSecrets",
            Addon::Istio => "isInstallIstio",
            Addon::IngressNginx => "isInstallIngressNginx",
            Addon::Linkerd => "isInstallLinkerd",
            Addon::Traefik => "isInstallTraefik",
            Addon::Prometheus => "isInstallPrometheus",
            Addon::Opencost => "isInstallOpencost",
            Addon::Strimzi => "isInstallStrimzi",
            Addon::PostgresOperator => "isInstallPostgresOperator",
            Addon::SolrOperator => "isInstallSolrOperator",
            Addon::Reflector => "isInstallReflector",
        };
        let mut toggles = vec![toggle(addon)];
        match addon {
            Addon::Linkerd => toggles.push(toggle(Addon::CertManager)),
            Addon::Opencost => toggles.push(toggle(Addon::Prometheus)),
            _ => {}
        }
        toggles
    }

    pub(crate) fn gke_input_with(toggles: &[&str]) -> StackInput {
        let mut data = format!("{GKE_INPUT}    kubernetesAddons:\n");
        for toggle in toggles {
            data.push_str(&format!("      {toggle}: true\n"));
        }
        StackInput::from_yaml(&data).unwrap()
    }

    fn release_names(stack: &Stack) -> Vec<String> {
        stack
            .resources_of_type(helm::RELEASE_TYPE)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    #[test]
    fn no_toggles_no_addons() {
        let stack = crate::plan(&gke_input_with(&[])).unwrap();
        assert!(release_names(&stack).is_empty());
        assert_eq!(stack.resources_of_type("kubernetes:core/v1:Namespace").count(), 0);
    }

    #[rstest]
    fn installer_runs_iff_toggle_is_set(
        #[values(
            Addon::CertManager,
            Addon::ExternalDns,
            Addon::ExternalSecrets,
            Addon::Istio,
            Addon::IngressNginx,
            Addon::Linkerd,
            Addon::Traefik,
            Addon::Prometheus,
            Addon::Opencost,
            Addon::Strimzi,
            Addon::PostgresOperator,
            Addon::SolrOperator,
            Addon::Reflector
        )]
        addon: Addon,
    ) {
        let input = gke_input_with(&toggles_for(addon));
        let enabled: Vec<_> = enabled_addons(input.addons()).collect();
        let stack = crate::plan(&input).unwrap();
        let releases = release_names(&stack);

        for other in Addon::ALL {
            let installed = releases.iter().any(|r| r.starts_with(other.name()));
            assert_eq!(installed, enabled.contains(&other), "{}", other.name());
        }
        assert!(enabled.contains(&addon));
    }

    #[test]
    fn addons_install_in_fixed_order() {
        let mut all: Vec<_> = Addon::ALL.iter().flat_map(|a| toggles_for(*a)).collect();
        all.sort();
        all.dedup();
        let input = gke_input_with(&all);
        let installed: Vec<_> = enabled_addons(input.addons()).collect();
        assert_eq!(installed, Addon::ALL);

        let stack = crate::plan(&input).unwrap();
        let first_release = |addon: Addon| {
            stack
                .resources()
                .position(|(name, d)| d.r#type == helm::RELEASE_TYPE && name.starts_with(addon.name()))
                .unwrap()
        };
        for pair in Addon::ALL.windows(2) {
            assert!(first_release(pair[0]) < first_release(pair[1]));
        }
    }

    #[test]
    fn namespaces_carry_kubernetes_labels() {
        let stack = crate::plan(&gke_input_with(&["isInstallReflector"])).unwrap();
        let namespace = &stack.resource("reflector-namespace").unwrap().properties;

        assert_eq!(namespace["apiVersion"], "v1");
        assert_eq!(namespace["kind"], "Namespace");
        assert_eq!(namespace["metadata"]["name"], "reflector");
        assert_eq!(
            namespace["metadata"]["labels"]["app.kubernetes.io/managed-by"],
            crate::vars::MANAGED_BY
        );
    }
}
