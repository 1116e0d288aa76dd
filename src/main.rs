//! mesh-injector - offline driver for the sidecar injection pipeline
//!
//! Reads the injector config, mesh snapshots and a pod manifest from YAML
//! files, runs the pipeline and prints the mutated pod.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::Pod;
use serde::de::DeserializeOwned;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mesh_injector::mesh::{Mesh, VirtualGateway, VirtualNode};
use mesh_injector::{ClusterIdentity, InjectConfig, SidecarInjector};

/// mesh-injector - inject service mesh sidecars into pod specifications
#[derive(Parser, Debug)]
#[command(name = "mesh-injector", version, about, long_about = None)]
struct Cli {
    /// Path to the injector configuration (YAML); defaults apply when omitted
    #[arg(short = 'c', long = "config", env = "MESH_INJECTOR_CONFIG")]
    config_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "MESH_INJECTOR_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inject a pod manifest and print the result
    Inject(InjectArgs),
}

/// Inject mode arguments
#[derive(Parser, Debug)]
struct InjectArgs {
    /// Pod manifest to mutate
    #[arg(long)]
    pod: PathBuf,

    /// Mesh snapshot
    #[arg(long)]
    mesh: PathBuf,

    /// Virtual node snapshot selecting the pod
    #[arg(
        long,
        conflicts_with = "virtual_gateway",
        required_unless_present = "virtual_gateway"
    )]
    virtual_node: Option<PathBuf>,

    /// Virtual gateway snapshot selecting the pod
    #[arg(long)]
    virtual_gateway: Option<PathBuf>,

    /// Account the controller runs under
    #[arg(long, env = "AWS_ACCOUNT_ID", default_value = "")]
    account_id: String,

    /// Control plane region
    #[arg(long, env = "AWS_REGION", default_value = "")]
    region: String,

    /// Controller version reported to the control plane
    #[arg(long, env = "APPMESH_CONTROLLER_VERSION")]
    controller_version: Option<String>,

    /// Kubernetes version reported to the control plane
    #[arg(long, env = "K8S_VERSION")]
    k8s_version: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the mutated pod on stdout stays pipeable
    tracing_subscriber::registry()
        .with(
            cli.log_json
                .then(|| fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with((!cli.log_json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match &cli.config_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
            InjectConfig::from_yaml(&content)?
        }
        None => InjectConfig::default(),
    };

    match cli.command {
        Commands::Inject(args) => run_inject(config, args),
    }
}

/// Run the pipeline against a pod manifest and print the mutated pod
fn run_inject(config: InjectConfig, args: InjectArgs) -> anyhow::Result<()> {
    let identity = ClusterIdentity {
        account_id: args.account_id,
        aws_region: args.region,
        controller_version: args.controller_version,
        k8s_version: args.k8s_version,
    };
    let injector = SidecarInjector::new(config, identity)
        .map_err(|e| anyhow::anyhow!("Invalid injector config: {}", e))?;

    let mut pod: Pod = read_yaml(&args.pod)?;
    let mesh: Mesh = read_yaml(&args.mesh)?;

    match (&args.virtual_node, &args.virtual_gateway) {
        (Some(path), _) => {
            let vn: VirtualNode = read_yaml(path)?;
            tracing::info!(virtual_node = %vn.name, "injecting pod");
            injector.inject(&mesh, &vn, &mut pod)?;
        }
        (None, Some(path)) => {
            let vg: VirtualGateway = read_yaml(path)?;
            tracing::info!(virtual_gateway = %vg.name, "injecting gateway pod");
            injector.inject_gateway(&mesh, &vg, &mut pod)?;
        }
        (None, None) => anyhow::bail!("one of --virtual-node or --virtual-gateway is required"),
    }

    let out = serde_yaml::to_string(&pod)
        .map_err(|e| anyhow::anyhow!("Failed to serialize pod: {}", e))?;
    print!("{out}");
    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", path, e))?;
    serde_yaml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse {:?}: {}", path, e))
}
