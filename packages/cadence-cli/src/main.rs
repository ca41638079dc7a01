use anyhow::{Context, Result};
use cadence_runloop::SchedulerConfig;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod host;
mod script;

use host::Host;
use script::{Runner, Script};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Inspect and simulate cadence run loops", long_about = None)]
struct Cli {
    /// JSON file with `queues` and `default_queue`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the queue drain order
    Queues,
    /// Replay a JSON script of scheduling steps and print what fires when
    Simulate {
        /// Script file
        script: PathBuf,

        /// Sleep on the wall clock instead of jumping virtual time
        #[arg(long)]
        realtime: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Queues => {
            for (i, queue) in config.queues.iter().enumerate() {
                let marker = if *queue == config.default_queue { "  (default)" } else { "" };
                println!("{:>2}. {}{}", i + 1, queue, marker);
            }
        }
        Commands::Simulate { script, realtime } => {
            let text = fs::read_to_string(&script)
                .with_context(|| format!("failed to read script {}", script.display()))?;
            let parsed: Script = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse script {}", script.display()))?;

            let host = if realtime { Host::realtime() } else { Host::virtual_time() };
            let mut runner = Runner::new(config, host)?;
            tracing::info!("Simulating {} step(s) from {}", parsed.steps.len(), script.display());
            runner.execute(&parsed).await?;

            println!("{} invocation(s) fired", runner.fired());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    let config = SchedulerConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!("Loaded {} queue(s) from {}", config.queues.len(), path.display());
    Ok(config)
}
