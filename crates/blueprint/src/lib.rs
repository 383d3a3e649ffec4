/// Stack input objects
pub mod api;

/// Declaration graph and program rendering
pub mod stack;

/// Derived per-run configuration
pub mod locals;

/// Pinned constants shared by every layer
pub mod vars;

/// Exported output keys and the stack-output reader
pub mod outputs;

/// IPv4 CIDR arithmetic for subnetwork ranges
pub mod cidr;

/// GKE cluster stack
pub mod gcp;

/// EKS cluster stack
pub mod aws;

/// Kubernetes cluster add-ons
pub mod addons;

use std::path::Path;

use thiserror::Error;
use tracing::{Level, instrument};

use crate::{api::StackInput, stack::Stack};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serde YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml_ng::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid stack input: {0}")]
    Validation(#[from] garde::Report),
    #[error("Invalid stack input: {0}")]
    InvalidInput(String),
    #[error("Invalid CIDR block {cidr}: {reason}")]
    InvalidCidr { cidr: String, reason: &'static str },
    #[error("Resource {0} is declared more than once")]
    DuplicateResource(String),
    #[error("Resource {resource} references undeclared resource {reference}")]
    UnknownResource { resource: String, reference: String },
    #[error("Output {0} is exported more than once")]
    DuplicateOutput(String),
    #[error("Missing field in object metadata: {0}")]
    MissingField(&'static str),
    #[error("{context}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach a static description of the attempted action to a failure.
pub trait WrapErr<T> {
    fn wrap_err(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> WrapErr<T> for std::result::Result<T, E> {
    fn wrap_err(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Wrapped {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }
}

/// Build the full declaration graph for a stack input.
#[instrument(level = Level::DEBUG, skip(input))]
pub fn plan(input: &StackInput) -> Result<Stack> {
    let mut stack = Stack::new(input.program_name()?);

    match input {
        StackInput::Gcp(gke) => {
            gcp::resources(&mut stack, gke).wrap_err("failed to declare gke cluster stack")?;
        }
        StackInput::Aws(eks) => {
            aws::resources(&mut stack, eks).wrap_err("failed to declare eks cluster stack")?;
        }
    }

    tracing::info!(
        resources = stack.resources().count(),
        outputs = stack.outputs().len(),
        "planned stack {}",
        stack.name()
    );

    Ok(stack)
}

/// Read and parse a stack input document (YAML or JSON).
pub async fn read_input(path: &Path) -> Result<StackInput> {
    let data = tokio::fs::read_to_string(path)
        .await
        .wrap_err(format!("failed to read stack input {}", path.display()))?;

    StackInput::from_yaml(&data)
}
