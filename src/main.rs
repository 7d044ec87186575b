//! `roster-scheduler` command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use roster_scheduler::builders::OrchestratorBuilder;
use roster_scheduler::config::SchedulerConfig;
use roster_scheduler::core::{AppResult, RunMode};
use roster_scheduler::infra::{load_roster, CommandSessionExecutor};
use roster_scheduler::runtime::{health, signals, ShutdownSignal};
use roster_scheduler::util::init_tracing;

/// Resource-aware batch scheduler for per-account session tasks.
#[derive(Parser)]
#[command(name = "roster-scheduler", version, about)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted).
    #[arg(long, env = "ROSTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Roster file: one `identifier credential` pair per line.
    #[arg(long, env = "ROSTER_FILE", default_value = "accounts.txt", global = true)]
    roster: PathBuf,

    /// Enable debug logging (`RUST_LOG` still wins).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scheduling cycles until interrupted.
    Run {
        /// Run a single account once and exit.
        #[arg(long, value_name = "ID")]
        account: Option<String>,

        /// Inspect the remote switch without changing it.
        #[arg(long)]
        check_only: bool,

        /// Stop after this many cycles (0 runs indefinitely).
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
    },

    /// Print the current load, policy and environment as JSON.
    Status,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::from_path(path)?,
        None => SchedulerConfig::default(),
    };

    match cli.command {
        Commands::Run {
            account,
            check_only,
            cycles,
        } => {
            if let Some(n) = cycles {
                config.cycle.max_cycles = n;
            }
            let mode = if check_only { RunMode::CheckOnly } else { RunMode::Toggle };
            run(config, &cli.roster, account.as_deref(), mode).await
        }
        Commands::Status => status(config, &cli.roster).await,
    }
}

async fn run(
    config: SchedulerConfig,
    roster_path: &std::path::Path,
    account: Option<&str>,
    mode: RunMode,
) -> AppResult<()> {
    let roster = load_roster(roster_path)?;
    let shutdown = ShutdownSignal::new();
    signals::install(shutdown.clone());

    let orchestrator = OrchestratorBuilder::new(config)
        .with_mode(mode)
        .with_shutdown(shutdown)
        .build()?;

    if let Some(id) = account {
        let target = roster
            .iter()
            .find(|a| a.identifier == id)
            .with_context(|| format!("account {id} not found in {}", roster_path.display()))?;
        let result = orchestrator.run_single(target).await;
        orchestrator.close().await;
        return match result {
            Ok(outcome) => {
                info!(
                    account_id = id,
                    enabled = outcome.enabled,
                    changed = outcome.changed,
                    "single run finished"
                );
                Ok(())
            }
            Err(e) => {
                error!(account_id = id, error = %e, "single run failed");
                Err(e.into())
            }
        };
    }

    orchestrator.run(&roster).await?;
    Ok(())
}

async fn status(config: SchedulerConfig, roster_path: &std::path::Path) -> AppResult<()> {
    let accounts = load_roster(roster_path).map(|r| r.len()).unwrap_or(0);
    let executor = Arc::new(CommandSessionExecutor::new(&config.session));
    let orchestrator = OrchestratorBuilder::new(config).with_executor(executor).build()?;
    // Give the primed CPU counters a measurable delta.
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    let status = orchestrator.status(accounts);
    let report = serde_json::json!({
        "health": health(&status),
        "accounts": accounts,
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
