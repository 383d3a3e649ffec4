use std::collections::BTreeMap;

use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Error, Result,
    stack::{ResourceRef, Stack},
};

use super::{
    AddedAddons, Addon, AddonContext,
    cert_manager::{
        CaIssuer, Certificate, CertificatePrivateKey, CertificateSpec, Issuer, IssuerRef,
        IssuerSpec, SELF_SIGNED_ISSUER,
    },
    helm::{self, Release},
    manifest,
};

pub const NAMESPACE: &str = "linkerd";

const TRUST_ANCHOR: &str = "linkerd-trust-anchor";
const IDENTITY_ISSUER: &str = "linkerd-identity-issuer";
const IDENTITY_DNS_NAME: &str = "identity.linkerd.cluster.local";

/// Makes the provider wait until cert-manager has issued the certificate's secret.
const WAIT_FOR_READY: (&str, &str) = ("pulumi.com/waitFor", "condition=Ready");

/// Linkerd with a cert-manager issued identity. cert-manager owns the trust anchor and
/// rotates the issuer certificate the control plane signs workload certificates with. The
/// anchor's public certificate is read back from its secret and handed to the chart, which
/// publishes it in the `linkerd-identity-trust-roots` ConfigMap.
#[instrument(level = Level::DEBUG, skip_all)]
pub fn resources(
    stack: &mut Stack,
    context: &AddonContext,
    installed: &AddedAddons,
) -> Result<ResourceRef> {
    let cert_manager = installed.release(Addon::CertManager).ok_or_else(|| {
        Error::InvalidInput("linkerd requires cert-manager to be installed first".to_string())
    })?;

    let namespace = super::namespace(stack, context, NAMESPACE)?;

    let certificates = manifest::objects(
        stack,
        context,
        "linkerd-certificates",
        &certificates(context)?,
        &namespace,
        &[cert_manager],
    )?;

    let trust_anchor = stack.read(
        "linkerd-trust-anchor-secret",
        "kubernetes:core/v1:Secret",
        &format!("{NAMESPACE}/{TRUST_ANCHOR}"),
        context.kubernetes().depends_on([&certificates]),
    )?;

    let crds = helm::release(
        stack,
        context,
        Release::new("linkerd-crds-release", &helm::LINKERD_CRDS, &namespace),
    )?;

    helm::release(
        stack,
        context,
        Release::new(
            "linkerd-control-plane-release",
            &helm::LINKERD_CONTROL_PLANE,
            &namespace,
        )
        .values(json!({
            "identityTrustAnchorsPEM": {
                "fn::fromBase64": trust_anchor.output(r#"data["ca.crt"]"#),
            },
            "identity": {
                "issuer": { "scheme": "kubernetes.io/tls" },
            },
        }))
        .depends_on(&crds)
        .depends_on(&certificates)
        .depends_on(&trust_anchor),
    )
}

/// Self-signed trust anchor, a CA issuer backed by it and the identity issuer
/// certificate it signs.
fn certificates(context: &AddonContext) -> Result<Vec<serde_json::Value>> {
    let ecdsa = || {
        Some(CertificatePrivateKey {
            algorithm: "ECDSA".to_string(),
        })
    };

    let awaited = |name: &str| {
        let mut metadata = context.metadata(name, Some(NAMESPACE));
        metadata.annotations = Some(BTreeMap::from([(
            WAIT_FOR_READY.0.to_string(),
            WAIT_FOR_READY.1.to_string(),
        )]));
        metadata
    };

    let mut trust_anchor = Certificate::new(
        TRUST_ANCHOR,
        CertificateSpec {
            secret_name: TRUST_ANCHOR.to_string(),
            common_name: Some("root.linkerd.cluster.local".to_string()),
            is_ca: true,
            private_key: ecdsa(),
            issuer_ref: IssuerRef::cluster_issuer(SELF_SIGNED_ISSUER),
            ..Default::default()
        },
    );
    trust_anchor.metadata = awaited(TRUST_ANCHOR);

    let mut issuer = Issuer::new(
        TRUST_ANCHOR,
        IssuerSpec {
            ca: Some(CaIssuer {
                secret_name: TRUST_ANCHOR.to_string(),
            }),
            ..Default::default()
        },
    );
    issuer.metadata = context.metadata(TRUST_ANCHOR, Some(NAMESPACE));

    let mut identity_issuer = Certificate::new(
        IDENTITY_ISSUER,
        CertificateSpec {
            secret_name: IDENTITY_ISSUER.to_string(),
            common_name: Some(IDENTITY_DNS_NAME.to_string()),
            is_ca: true,
            duration: Some("48h".to_string()),
            renew_before: Some("25h".to_string()),
            dns_names: vec![IDENTITY_DNS_NAME.to_string()],
            usages: ["cert sign", "crl sign", "server auth", "client auth"]
                .map(str::to_string)
                .to_vec(),
            private_key: ecdsa(),
            issuer_ref: IssuerRef::issuer(TRUST_ANCHOR),
        },
    );
    identity_issuer.metadata = awaited(IDENTITY_ISSUER);

    Ok(vec![
        serde_json::to_value(&trust_anchor)?,
        serde_json::to_value(&issuer)?,
        serde_json::to_value(&identity_issuer)?,
    ])
}

#[cfg(test)]
mod tests {
    use crate::addons::{
        Addon,
        tests::{gke_input_with, toggles_for},
    };

    #[test]
    fn identity_issuer_chains_to_self_signed_anchor() {
        let stack = crate::plan(&gke_input_with(&toggles_for(Addon::Linkerd))).unwrap();

        let certificates = stack.resource("linkerd-certificates").unwrap();
        assert_eq!(
            certificates.options.dependencies(),
            ["linkerd-namespace", "cert-manager-release"]
        );

        let objs = certificates.properties["objs"].as_array().unwrap();
        let kinds: Vec<_> = objs.iter().map(|o| o["kind"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["Certificate", "Issuer", "Certificate"]);

        assert_eq!(objs[0]["spec"]["isCA"], true);
        assert_eq!(objs[0]["spec"]["issuerRef"]["kind"], "ClusterIssuer");
        assert_eq!(objs[0]["spec"]["issuerRef"]["name"], "self-signed");
        assert_eq!(objs[1]["spec"]["ca"]["secretName"], "linkerd-trust-anchor");
        assert_eq!(objs[2]["metadata"]["namespace"], "linkerd");
        assert_eq!(objs[2]["spec"]["issuerRef"]["kind"], "Issuer");
        assert_eq!(objs[2]["spec"]["duration"], "48h");
        assert_eq!(objs[2]["spec"]["renewBefore"], "25h");
        assert_eq!(objs[2]["spec"]["dnsNames"][0], "identity.linkerd.cluster.local");

        assert_eq!(objs[0]["metadata"]["annotations"]["pulumi.com/waitFor"], "condition=Ready");
        assert_eq!(objs[2]["metadata"]["annotations"]["pulumi.com/waitFor"], "condition=Ready");
    }

    #[test]
    fn control_plane_trusts_anchor_read_from_its_secret() {
        let stack = crate::plan(&gke_input_with(&toggles_for(Addon::Linkerd))).unwrap();
        let program = serde_json::to_value(stack.program()).unwrap();

        let anchor = &program["resources"]["linkerd-trust-anchor-secret"];
        assert_eq!(anchor["type"], "kubernetes:core/v1:Secret");
        assert_eq!(anchor["get"]["id"], "linkerd/linkerd-trust-anchor");
        assert_eq!(anchor["options"]["provider"], "${kubernetes-provider}");
        assert_eq!(anchor["options"]["dependsOn"][0], "${linkerd-certificates}");

        let control_plane = stack.resource("linkerd-control-plane-release").unwrap();
        let values = &control_plane.properties["values"];
        assert_eq!(
            values["identityTrustAnchorsPEM"]["fn::fromBase64"],
            r#"${linkerd-trust-anchor-secret.data["ca.crt"]}"#
        );
        assert!(values["identity"].get("externalCA").is_none());
        assert_eq!(values["identity"]["issuer"]["scheme"], "kubernetes.io/tls");
        assert_eq!(
            control_plane.options.dependencies(),
            [
                "linkerd-crds-release",
                "linkerd-certificates",
                "linkerd-trust-anchor-secret"
            ]
        );
    }
}
