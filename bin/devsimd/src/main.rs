//! ---
//! devsim_section: "04-daemon"
//! devsim_subsection: "binary"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Binary entrypoint for the device simulator daemon."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use devsim_common::{init_tracing, AppConfig};
use devsim_core::{AddressSpaceCoordinator, JsonTemplateLoader, LocalRuntime, SpacePlan};
use devsim_nodes::NodeId;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Simulated device address space daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "N", help = "Override the instance count of every device kind")]
    devices_per_kind: Option<u32>,

    #[arg(long, help = "URI the local runtime registers as its server namespace")]
    server_uri: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Build the address space and simulate until ctrl-c")]
    Run,
    #[command(about = "Build the address space once and print it as JSON")]
    Dump,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/devsim.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("devsimd", &config.logging)?;
    info!(config_path = %loaded.source.display(), kinds = config.devices.len(), "configuration loaded");

    let mut plan = SpacePlan::from_config(&config);
    if let Some(count) = cli.devices_per_kind {
        plan = plan.with_devices_per_kind(count);
    }
    let runtime = Arc::new(match cli.server_uri {
        Some(uri) => LocalRuntime::new(uri),
        None => LocalRuntime::default(),
    });

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(plan, runtime).await,
        Commands::Dump => {
            plan.simulate = false;
            let mut coordinator =
                AddressSpaceCoordinator::new(plan, runtime, Box::new(JsonTemplateLoader));
            let report = coordinator.build();
            if report.is_fatal() {
                bail!("address space build failed: {:?}", report.contract_violation);
            }
            println!("{}", coordinator.space().to_json()?);
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
            coordinator.shutdown().await
        }
    }
}

async fn run_daemon(plan: SpacePlan, runtime: Arc<LocalRuntime>) -> Result<()> {
    let mut coordinator =
        AddressSpaceCoordinator::new(plan, runtime.clone(), Box::new(JsonTemplateLoader));
    let report = coordinator.build();
    if report.is_fatal() {
        bail!("address space build failed: {:?}", report.contract_violation);
    }
    for failure in &report.failures {
        warn!(kind = %failure.kind, instance = ?failure.instance, error = %failure.error, "device not built");
    }

    info!(
        namespace = ?report.namespace,
        instances = report.instance_count(),
        roots = runtime.root_references(&NodeId::objects_folder()).len(),
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(scheduler) = coordinator.scheduler() {
        let stats = scheduler.stats();
        info!(succeeded = stats.succeeded, failed = stats.failed, "simulation totals");
    }
    coordinator.shutdown().await
}
