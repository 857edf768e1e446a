use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kai_binder::dra::{ClaimStore, DraClaimPlugin};
use kai_binder::reconciler::spawn_workers;
use kai_binder::reservation::{ReservationStore, ResourceReservationPlugin};
use kai_binder::state_machine::{AlwaysValid, BindWorkflow, InMemoryBindSink, NoVolumes};
use kai_common::BinderConfig;
use log::info;

#[derive(Parser)]
#[command(name = "kai-binder", version, about = "BindRequest reconciler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one batch of BindRequests against a config file, or
    /// built-in defaults if omitted.
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config } => {
            let config: BinderConfig = match config {
                Some(path) => {
                    let raw = fs::read_to_string(path)
                        .with_context(|| format!("reading binder config at {}", path.display()))?;
                    serde_yaml::from_str(&raw).context("parsing binder config")?
                }
                None => BinderConfig::default(),
            };

            info!(
                "kai-binder starting with {} workers against reservation namespace {}",
                config.max_concurrent_reconciles, config.reservation_namespace
            );

            let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
            runtime.block_on(run(config))
        }
    }
}

async fn run(config: BinderConfig) -> anyhow::Result<()> {
    let workflow = Arc::new(BindWorkflow::new(
        Arc::new(AlwaysValid),
        Arc::new(ResourceReservationPlugin::new(
            Arc::new(kai_common::GpuGroupRegistry::new()),
            Arc::new(ReservationStore::new()),
            config.reservation_namespace.clone(),
            config.resource_reservation_allocation_timeout(),
        )),
        Arc::new(DraClaimPlugin::new(Arc::new(ClaimStore::new()), true)),
        Arc::new(NoVolumes),
        Arc::new(InMemoryBindSink::new()),
        config.volume_binding_timeout(),
    ));

    let (tx, rx) = tokio::sync::mpsc::channel(config.max_concurrent_reconciles * 4);
    let workers = spawn_workers(config.max_concurrent_reconciles, workflow, rx, |request| {
        info!("reconcile finished for {}: {:?}", request.pod_name, request.phase);
    });

    // No watch loop against a real apiserver in this scope (SPEC_FULL.md
    // §1); this binary exercises the reconciler against an empty queue so
    // the worker pool starts, logs, and exits cleanly.
    drop(tx);
    for handle in workers {
        handle.await.context("reconcile worker panicked")?;
    }

    Ok(())
}
