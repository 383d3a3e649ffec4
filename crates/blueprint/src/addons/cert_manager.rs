use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    outputs,
    stack::{ResourceRef, Stack},
};

use super::{
    AddonContext,
    helm::{self, Release},
    identity::{self, IdentityRequest},
    manifest,
};

pub const NAMESPACE: &str = "cert-manager";
const SERVICE_ACCOUNT: &str = "cert-manager";

/// Cluster-wide issuer for self-signed certificates.
pub const SELF_SIGNED_ISSUER: &str = "self-signed";

/// `cert-manager.io/v1` ClusterIssuer
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "ClusterIssuer",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIssuerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedIssuer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaIssuer>,
}

/// `cert-manager.io/v1` Issuer
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Issuer",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedIssuer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaIssuer>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SelfSignedIssuer {}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaIssuer {
    pub secret_name: String,
}

/// `cert-manager.io/v1` Certificate
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub secret_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(rename = "isCA")]
    pub is_ca: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<CertificatePrivateKey>,
    pub issuer_ref: IssuerRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CertificatePrivateKey {
    pub algorithm: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct IssuerRef {
    pub name: String,
    pub kind: String,
    pub group: String,
}

impl IssuerRef {
    pub fn cluster_issuer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "ClusterIssuer".to_string(),
            group: "cert-manager.io".to_string(),
        }
    }

    pub fn issuer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "Issuer".to_string(),
            group: "cert-manager.io".to_string(),
        }
    }
}

#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(stack: &mut Stack, context: &AddonContext) -> Result<ResourceRef> {
    let namespace = super::namespace(stack, context, NAMESPACE)?;

    // dns01 challenges need write access to the managed zones
    let identity = identity::resources(
        stack,
        context,
        &IdentityRequest {
            name: SERVICE_ACCOUNT,
            namespace: NAMESPACE,
            description: "cert-manager service account for solving dns challenges to issue certificates",
            gcp_roles: &["roles/dns.admin"],
            aws_policy_arns: &["arn:aws:iam::aws:policy/AmazonRoute53FullAccess"],
            gcp_output_key: outputs::CERT_MANAGER_GSA_EMAIL,
            aws_output_key: outputs::CERT_MANAGER_IAM_ROLE_ARN,
        },
    )?;

    let service_account =
        super::service_account(stack, context, &namespace, SERVICE_ACCOUNT, &identity)?;

    let release = helm::release(
        stack,
        context,
        Release::new("cert-manager-release", &helm::CERT_MANAGER, &namespace)
            .values(json!({
                "crds": { "enabled": true, "keep": true },
                "serviceAccount": { "create": false, "name": SERVICE_ACCOUNT },
                "extraArgs": [
                    "--dns01-recursive-nameservers-only",
                    "--dns01-recursive-nameservers=8.8.8.8:53,1.1.1.1:53",
                ],
            }))
            .depends_on(&service_account),
    )?;

    let mut issuer = ClusterIssuer::new(
        SELF_SIGNED_ISSUER,
        ClusterIssuerSpec {
            self_signed: Some(SelfSignedIssuer {}),
            ..Default::default()
        },
    );
    issuer.metadata.labels = Some(context.labels.clone());

    manifest::objects(
        stack,
        context,
        "cert-manager-cluster-issuer",
        &[issuer],
        &release,
        &[],
    )?;

    Ok(release)
}
