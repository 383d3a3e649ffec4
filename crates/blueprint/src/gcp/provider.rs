use serde_json::json;
use tracing::{Level, instrument};

use crate::{
    Result,
    api::GcpCredential,
    stack::{ResourceOptions, ResourceRef, Stack},
};

pub const GCP_PROVIDER: &str = "gcp-provider";

/// Explicit google provider authenticated with the service account key from the input.
/// The key stays base64-encoded in the program and is decoded and marked secret by the engine.
#[instrument(level = Level::DEBUG, skip(stack, credential))]
pub fn resources(stack: &mut Stack, credential: &GcpCredential) -> Result<ResourceRef> {
    stack.declare(
        GCP_PROVIDER,
        "pulumi:providers:gcp",
        json!({
            "credentials": {
                "fn::secret": {
                    "fn::fromBase64": credential.service_account_key_base64,
                },
            },
        }),
        ResourceOptions::new(),
    )
}
