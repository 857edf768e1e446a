use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kai_common::SchedulerConfig;
use kai_scheduler::actions::run_pipeline;
use kai_scheduler::cache::Cache;
use kai_scheduler::plugins::Registry;
use kai_scheduler::session::Session;
use log::info;

#[derive(Parser)]
#[command(name = "kai-scheduler", version, about = "GPU-aware gang scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduling session against a config file, or built-in defaults if omitted.
    Start {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Start { config } => {
            let config: SchedulerConfig = match config {
                Some(path) => {
                    let raw = fs::read_to_string(path)
                        .with_context(|| format!("reading scheduler config at {}", path.display()))?;
                    serde_yaml::from_str(&raw).context("parsing scheduler config")?
                }
                None => SchedulerConfig::default(),
            };

            info!("kai-scheduler starting as {:?}", config.scheduler_name);

            let mut cache = Cache::new(Duration::from_secs(60));
            cache.mark_synced();
            let cluster = cache.snapshot().context("initial cache snapshot")?;

            let registry = Arc::new(Registry::default_with(&config.queue_label_key));
            let mut session = Session::open(cluster, registry, config);
            let report = run_pipeline(&mut session);

            info!(
                "session complete: {} allocated, {} reclaimed, {} consolidated, {} preempted",
                report.allocate.placed.len(),
                report.reclaim.outcomes.len(),
                report.consolidate.outcomes.len(),
                report.preempt.outcomes.len(),
            );
        }
    }

    Ok(())
}
