use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    addons::{self, AddonContext, WorkloadIdentity},
    api::EksClusterStackInput,
    locals::Locals,
    stack::Stack,
};

pub mod cluster;
pub mod kubernetes;
pub mod network;
pub mod provider;

/// Declare the complete EKS stack: VPC (unless one is supplied), cluster with its OIDC
/// provider and the enabled add-ons with IRSA identities.
#[instrument(level = Level::DEBUG, skip(stack, input))]
pub fn resources(stack: &mut Stack, input: &EksClusterStackInput) -> Result<()> {
    let locals = Locals::for_eks(&input.target)?;
    let spec = &input.target.spec;

    let aws_provider = provider::resources(stack, &input.aws_credential, &spec.region)
        .wrap_err("failed to set up aws provider")?;

    let network = network::resources(stack, &locals, spec, &aws_provider)
        .wrap_err("failed to add vpc")?;

    let cluster = cluster::resources(stack, &locals, spec, &aws_provider, &network)
        .wrap_err("failed to add eks cluster")?;

    let kubernetes_provider =
        kubernetes::provider(stack, &input.aws_credential, &spec.region, &cluster)
            .wrap_err("failed to set up kubernetes provider")?;

    let context = AddonContext {
        cluster_name: locals.cluster_name.clone(),
        kubernetes_provider,
        identity: WorkloadIdentity::Aws {
            provider: aws_provider,
            region: spec.region.clone(),
            oidc_provider_arn: cluster.output("oidcProviderArn"),
            oidc_issuer: cluster.output("oidcIssuer"),
            cluster,
        },
        labels: locals.kubernetes_labels.clone(),
        domain_filters: spec.kubernetes_addons.external_dns_domain_filters.clone(),
    };
    addons::resources(stack, &context, &spec.kubernetes_addons).wrap_err("failed to add addons")?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{api::StackInput, outputs};

    pub(crate) const EKS_INPUT: &str = r#"
provider: aws
awsCredential:
  accessKeyId: AKIAEXAMPLE
  secretAccessKey: secret
  region: us-east-1
target:
  apiVersion: code2cloud.planton.cloud/v1
  kind: EksCluster
  metadata:
    name: demo
    labels:
      team: platform
  spec:
    region: us-east-1
    desiredCapacity: 2
    minSize: 1
    maxSize: 3
"#;

    pub(crate) fn eks_input_with(toggles: &[&str]) -> StackInput {
        let mut data = format!("{EKS_INPUT}    kubernetesAddons:\n");
        for toggle in toggles {
            data.push_str(&format!("      {toggle}: true\n"));
        }
        StackInput::from_yaml(&data).unwrap()
    }

    #[test]
    fn plans_eks_stack_with_core_outputs() {
        let stack = crate::plan(&StackInput::from_yaml(EKS_INPUT).unwrap()).unwrap();

        for key in [
            outputs::CLUSTER_VPC_ID,
            outputs::KUBECONFIG,
            outputs::CLUSTER_ENDPOINT,
            outputs::CLUSTER_CA_DATA,
            outputs::CLUSTER_NAME,
        ] {
            assert!(stack.outputs().contains_key(key), "missing output {key}");
        }
        assert!(stack.resource("vpc").is_some());
        assert!(stack.resource("cluster").is_some());
        assert_eq!(stack.resources_of_type("gcp:organizations:Folder").count(), 0);
    }

    #[test]
    fn addon_identities_are_iam_roles_trusting_cluster_oidc() {
        let stack = crate::plan(&eks_input_with(&["isInstallExternalDns"])).unwrap();

        let role = stack.resource("external-dns-iam-role").unwrap();
        assert_eq!(role.options.parent_name(), Some("cluster"));
        assert_eq!(role.options.provider_name(), Some("aws-provider"));

        let statement =
            &role.properties["assumeRolePolicy"]["fn::invoke"]["arguments"]["statements"][0];
        assert_eq!(
            statement["principals"][0]["identifiers"][0],
            "${cluster.oidcProviderArn}"
        );
        assert_eq!(
            statement["conditions"][0]["variable"],
            "${cluster.oidcIssuer}:sub"
        );
        assert_eq!(
            statement["conditions"][0]["values"][0],
            "system:serviceaccount:external-dns:external-dns"
        );

        let ksa = &stack.resource("external-dns-ksa").unwrap().properties;
        assert_eq!(
            ksa["metadata"]["annotations"]["eks.amazonaws.com/role-arn"],
            "${external-dns-iam-role.arn}"
        );
        assert_eq!(
            stack.outputs()[outputs::EXTERNAL_DNS_IAM_ROLE_ARN],
            "${external-dns-iam-role.arn}"
        );
        assert!(stack.resource("external-dns-amazonroute53fullaccess").is_some());

        let values = &stack.resource("external-dns-release").unwrap().properties["values"];
        assert_eq!(values["provider"]["name"], "aws");
        assert_eq!(values["env"][0]["value"], "us-east-1");
    }

    #[test]
    fn secret_store_uses_cluster_region() {
        let stack = crate::plan(&eks_input_with(&["isInstallExternalSecrets"])).unwrap();

        let store = &stack
            .resource("external-secrets-cluster-secret-store")
            .unwrap()
            .properties["objs"][0];
        assert_eq!(store["metadata"]["name"], "aws-secrets-manager");
        assert_eq!(store["spec"]["provider"]["aws"]["region"], "us-east-1");
        assert_eq!(store["spec"]["provider"]["aws"]["service"], "SecretsManager");
    }
}
