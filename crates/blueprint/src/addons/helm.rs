use serde_json::{Value, json};

use crate::{
    Result, WrapErr,
    stack::{ResourceRef, Stack},
    vars,
};

use super::AddonContext;

pub const RELEASE_TYPE: &str = "kubernetes:helm.sh/v3:Release";

/// Pinned chart coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelmChart {
    pub release_name: &'static str,
    pub chart: &'static str,
    pub version: &'static str,
    pub repo: &'static str,
}

pub const CERT_MANAGER: HelmChart = HelmChart {
    release_name: "cert-manager",
    chart: "cert-manager",
    version: "v1.15.1",
    repo: "https://charts.jetstack.io",
};

pub const EXTERNAL_DNS: HelmChart = HelmChart {
    release_name: "external-dns",
    chart: "external-dns",
    version: "1.14.5",
    repo: "https://kubernetes-sigs.github.io/external-dns",
};

pub const EXTERNAL_SECRETS: HelmChart = HelmChart {
    release_name: "external-secrets",
    chart: "external-secrets",
    version: "0.9.20",
    repo: "https://charts.external-secrets.io",
};

const ISTIO_REPO: &str = "https://istio-release.storage.googleapis.com/charts";
const ISTIO_VERSION: &str = "1.22.3";

pub const ISTIO_BASE: HelmChart = HelmChart {
    release_name: "istio-base",
    chart: "base",
    version: ISTIO_VERSION,
    repo: ISTIO_REPO,
};

pub const ISTIOD: HelmChart = HelmChart {
    release_name: "istiod",
    chart: "istiod",
    version: ISTIO_VERSION,
    repo: ISTIO_REPO,
};

pub const ISTIO_GATEWAY: HelmChart = HelmChart {
    release_name: "istio-ingress",
    chart: "gateway",
    version: ISTIO_VERSION,
    repo: ISTIO_REPO,
};

pub const INGRESS_NGINX: HelmChart = HelmChart {
    release_name: "ingress-nginx",
    chart: "ingress-nginx",
    version: "4.11.1",
    repo: "https://kubernetes.github.io/ingress-nginx",
};

const LINKERD_REPO: &str = "https://helm.linkerd.io/stable";

pub const LINKERD_CRDS: HelmChart = HelmChart {
    release_name: "linkerd-crds",
    chart: "linkerd-crds",
    version: "1.8.0",
    repo: LINKERD_REPO,
};

pub const LINKERD_CONTROL_PLANE: HelmChart = HelmChart {
    release_name: "linkerd-control-plane",
    chart: "linkerd-control-plane",
    version: "1.16.11",
    repo: LINKERD_REPO,
};

pub const TRAEFIK: HelmChart = HelmChart {
    release_name: "traefik",
    chart: "traefik",
    version: "30.0.2",
    repo: "https://traefik.github.io/charts",
};

pub const KUBE_PROMETHEUS_STACK: HelmChart = HelmChart {
    release_name: "kube-prometheus-stack",
    chart: "kube-prometheus-stack",
    version: "61.3.2",
    repo: "https://prometheus-community.github.io/helm-charts",
};

pub const OPENCOST: HelmChart = HelmChart {
    release_name: "opencost",
    chart: "opencost",
    version: "1.40.0",
    repo: "https://opencost.github.io/opencost-helm-chart",
};

pub const STRIMZI: HelmChart = HelmChart {
    release_name: "strimzi-kafka-operator",
    chart: "strimzi-kafka-operator",
    version: "0.42.0",
    repo: "https://strimzi.io/charts",
};

pub const POSTGRES_OPERATOR: HelmChart = HelmChart {
    release_name: "postgres-operator",
    chart: "postgres-operator",
    version: "1.12.2",
    repo: "https://opensource.zalando.com/postgres-operator/charts/postgres-operator",
};

pub const SOLR_OPERATOR: HelmChart = HelmChart {
    release_name: "solr-operator",
    chart: "solr-operator",
    version: "0.8.1",
    repo: "https://solr.apache.org/charts",
};

pub const REFLECTOR: HelmChart = HelmChart {
    release_name: "reflector",
    chart: "reflector",
    version: "7.1.288",
    repo: "https://emberstack.github.io/helm-charts",
};

/// Release request for [`release`].
pub struct Release<'a> {
    /// Logical resource name in the stack.
    pub name: &'a str,
    pub chart: &'a HelmChart,
    pub namespace: &'a ResourceRef,
    pub values: Value,
    /// Roll back on failure.
    pub atomic: bool,
    pub depends_on: Vec<&'a ResourceRef>,
}

impl<'a> Release<'a> {
    pub fn new(name: &'a str, chart: &'a HelmChart, namespace: &'a ResourceRef) -> Self {
        Self {
            name,
            chart,
            namespace,
            values: json!({}),
            atomic: true,
            depends_on: Vec::new(),
        }
    }

    pub fn values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn depends_on(mut self, resource: &'a ResourceRef) -> Self {
        self.depends_on.push(resource);
        self
    }
}

/// Declare a Helm release with the fixed release policy: the namespace already exists,
/// failed installs are cleaned up, hooks and jobs are awaited, and status fields that the
/// provider rewrites on every refresh are ignored.
pub fn release(stack: &mut Stack, context: &AddonContext, release: Release) -> Result<ResourceRef> {
    let chart = release.chart;

    stack
        .declare(
            release.name,
            RELEASE_TYPE,
            json!({
                "name": chart.release_name,
                "namespace": release.namespace.output("metadata.name"),
                "chart": chart.chart,
                "version": chart.version,
                "repositoryOpts": { "repo": chart.repo },
                "createNamespace": false,
                "atomic": release.atomic,
                "cleanupOnFail": true,
                "waitForJobs": true,
                "timeout": vars::HELM_TIMEOUT_SECONDS,
                "values": release.values,
            }),
            context
                .kubernetes()
                .parent(release.namespace)
                .depends_on(release.depends_on)
                .ignore_changes(&["status", "description", "resourceNames"]),
        )
        .wrap_err(format!("failed to add {} helm release", chart.release_name))
}
