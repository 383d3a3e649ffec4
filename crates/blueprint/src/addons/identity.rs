use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result, WrapErr,
    stack::{ResourceOptions, ResourceRef, Stack},
    vars,
};

use super::{AddonContext, WorkloadIdentity};

/// Cloud identity an add-on's service account runs as.
pub struct IdentityRequest<'a> {
    /// Account id on GCP, role name prefix on AWS, and the Kubernetes service account name.
    pub name: &'a str,
    pub namespace: &'a str,
    pub description: &'a str,
    pub gcp_roles: &'a [&'a str],
    pub aws_policy_arns: &'a [&'a str],
    pub gcp_output_key: &'a str,
    pub aws_output_key: &'a str,
}

pub struct AddedIdentity {
    pub annotation_key: &'static str,
    /// Service account email or role ARN, as an interpolation.
    pub annotation_value: String,
}

#[instrument(level = Level::DEBUG, skip_all, fields(identity = request.name))]
pub fn resources(
    stack: &mut Stack,
    context: &AddonContext,
    request: &IdentityRequest,
) -> Result<AddedIdentity> {
    match &context.identity {
        WorkloadIdentity::Gcp {
            provider,
            project_id,
            cluster,
        } => google_service_account(stack, request, provider, project_id, cluster),
        WorkloadIdentity::Aws {
            provider,
            oidc_provider_arn,
            oidc_issuer,
            cluster,
            ..
        } => iam_role(stack, request, provider, oidc_provider_arn, oidc_issuer, cluster),
    }
}

fn google_service_account(
    stack: &mut Stack,
    request: &IdentityRequest,
    provider: &ResourceRef,
    project_id: &str,
    cluster: &ResourceRef,
) -> Result<AddedIdentity> {
    let name = request.name;

    let account = stack
        .declare(
            &format!("{name}-gsa"),
            "gcp:serviceaccount:Account",
            json!({
                "project": project_id,
                "accountId": name,
                "displayName": name,
                "description": request.description,
            }),
            ResourceOptions::new().parent(cluster).provider(provider),
        )
        .wrap_err(format!("failed to add {name} google service account"))?;

    stack.export(request.gcp_output_key, account.output("email"))?;

    // the workload pool only exists once the cluster does
    stack
        .declare(
            &format!("{name}-workload-identity"),
            "gcp:serviceaccount:IAMBinding",
            json!({
                "serviceAccountId": account.output("name"),
                "role": "roles/iam.workloadIdentityUser",
                "members": [format!(
                    "serviceAccount:{project_id}.svc.id.goog[{}/{name}]",
                    request.namespace
                )],
            }),
            ResourceOptions::new()
                .parent(&account)
                .provider(provider)
                .depends_on([cluster]),
        )
        .wrap_err(format!("failed to add {name} workload identity binding"))?;

    for role in request.gcp_roles {
        stack
            .declare(
                &format!("{name}-{}", role_slug(role)),
                "gcp:projects:IAMMember",
                json!({
                    "project": project_id,
                    "role": role,
                    "member": format!("serviceAccount:{}", account.output("email")),
                }),
                ResourceOptions::new().parent(&account).provider(provider),
            )
            .wrap_err(format!("failed to grant {role} to {name}"))?;
    }

    Ok(AddedIdentity {
        annotation_key: vars::GKE_WORKLOAD_IDENTITY_ANNOTATION,
        annotation_value: account.output("email"),
    })
}

fn iam_role(
    stack: &mut Stack,
    request: &IdentityRequest,
    provider: &ResourceRef,
    oidc_provider_arn: &str,
    oidc_issuer: &str,
    cluster: &ResourceRef,
) -> Result<AddedIdentity> {
    let name = request.name;

    // condition variables become map keys in the policy json, and keys are never
    // interpolated
    let assume_role_policy = json!({
        "fn::invoke": {
            "function": "aws:iam:getPolicyDocument",
            "arguments": {
                "statements": [{
                    "effect": "Allow",
                    "actions": ["sts:AssumeRoleWithWebIdentity"],
                    "principals": [{
                        "type": "Federated",
                        "identifiers": [oidc_provider_arn],
                    }],
                    "conditions": [
                        {
                            "test": "StringEquals",
                            "variable": format!("{oidc_issuer}:sub"),
                            "values": [format!("system:serviceaccount:{}:{name}", request.namespace)],
                        },
                        {
                            "test": "StringEquals",
                            "variable": format!("{oidc_issuer}:aud"),
                            "values": ["sts.amazonaws.com"],
                        },
                    ],
                }],
            },
            "options": { "provider": provider.handle() },
            "return": "json",
        },
    });

    let role = stack
        .declare(
            &format!("{name}-iam-role"),
            "aws:iam:Role",
            json!({
                "namePrefix": format!("{name}-"),
                "description": request.description,
                "assumeRolePolicy": assume_role_policy,
            }),
            ResourceOptions::new()
                .parent(cluster)
                .provider(provider),
        )
        .wrap_err(format!("failed to add {name} iam role"))?;

    stack.export(request.aws_output_key, role.output("arn"))?;

    for policy_arn in request.aws_policy_arns {
        let policy = policy_arn.rsplit('/').next().unwrap_or(*policy_arn);
        stack
            .declare(
                &format!("{name}-{}", policy.to_ascii_lowercase()),
                "aws:iam:RolePolicyAttachment",
                json!({
                    "role": role.output("name"),
                    "policyArn": policy_arn,
                }),
                ResourceOptions::new().parent(&role).provider(provider),
            )
            .wrap_err(format!("failed to attach {policy} to {name}"))?;
    }

    Ok(AddedIdentity {
        annotation_key: vars::EKS_WORKLOAD_IDENTITY_ANNOTATION,
        annotation_value: role.output("arn"),
    })
}

/// `roles/dns.admin` -> `dns-admin`
fn role_slug(role: &str) -> String {
    role.trim_start_matches("roles/").replace('.', "-")
}
