use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kube::CustomResourceExt;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blueprint::{
    api::{EksCluster, GkeCluster},
    outputs::{EksStackOutputs, GkeStackOutputs, NodePoolOutputs, StackOutputs},
};

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Build the cluster program for a stack input
    Plan {
        #[arg(long, env = "BLUEPRINT_INPUT")]
        input: PathBuf,
        #[arg(long, env = "BLUEPRINT_FORMAT", value_enum, default_value_t = Format::Yaml)]
        format: Format,
        /// Write the program here instead of stdout
        #[arg(long, env = "BLUEPRINT_OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Read a stack-output JSON document into typed outputs
    Outputs {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        provider: Provider,
        /// Node pools to read per-pool outputs for (gcp only)
        #[arg(long = "node-pool")]
        node_pools: Vec<String>,
    },
    /// Output K8s manifest for a given stack input CRD
    #[command(subcommand)]
    CrdManifest(Crd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Gcp,
    Aws,
}

#[derive(Debug, Clone, Subcommand)]
enum Crd {
    Gke,
    Eks,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GkeReport {
    #[serde(flatten)]
    outputs: GkeStackOutputs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    node_pools: Vec<NodePoolOutputs>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::from_default_env())
        .try_init()?;

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Plan {
            input,
            format,
            output,
        }) => plan(input, format, output).await?,
        Some(Commands::Outputs {
            input,
            provider,
            node_pools,
        }) => read_outputs(input, provider, &node_pools).await?,
        Some(Commands::CrdManifest(crd)) => {
            let crd = match crd {
                Crd::Gke => GkeCluster::crd(),
                Crd::Eks => EksCluster::crd(),
            };

            println!("{}", serde_yaml_ng::to_string(&crd)?);
        }
        None => {}
    }

    Ok(())
}

async fn plan(input: PathBuf, format: Format, output: Option<PathBuf>) -> anyhow::Result<()> {
    let stack_input = blueprint::read_input(&input).await?;
    let stack = blueprint::plan(&stack_input)?;

    let program = stack.program();
    let rendered = match format {
        Format::Yaml => program.to_yaml()?,
        Format::Json => program.to_json()?,
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("failed to write program to {}", path.display()))?;
            tracing::info!("wrote program {} to {}", stack.name(), path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

async fn read_outputs(input: PathBuf, provider: Provider, node_pools: &[String]) -> anyhow::Result<()> {
    let data = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("failed to read stack outputs {}", input.display()))?;
    let outputs = StackOutputs::from_json(&data)?;

    let rendered = match provider {
        Provider::Gcp => serde_yaml_ng::to_string(&GkeReport {
            outputs: GkeStackOutputs::read(&outputs),
            node_pools: node_pools
                .iter()
                .map(|pool| NodePoolOutputs::read(&outputs, pool))
                .collect(),
        })?,
        Provider::Aws => {
            if !node_pools.is_empty() {
                tracing::warn!("node pool outputs are only exported by gke stacks");
            }
            serde_yaml_ng::to_string(&EksStackOutputs::read(&outputs))?
        }
    };

    print!("{rendered}");
    Ok(())
}
