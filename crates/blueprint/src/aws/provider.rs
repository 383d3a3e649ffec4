use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    api::AwsCredential,
    stack::{ResourceOptions, ResourceRef, Stack},
};

pub const AWS_PROVIDER: &str = "aws-provider";

/// Explicit aws provider for the cluster region, authenticated with the access key pair.
#[instrument(level = Level::DEBUG, skip(stack, credential))]
pub fn resources(
    stack: &mut Stack,
    credential: &AwsCredential,
    region: &str,
) -> Result<ResourceRef> {
    stack.declare(
        AWS_PROVIDER,
        "pulumi:providers:aws",
        json!({
            "region": region,
            "accessKey": credential.access_key_id,
            "secretKey": { "fn::secret": credential.secret_access_key },
        }),
        ResourceOptions::new(),
    )
}
