//! GrowLab CLI
//!
//! Runs lab operations against the local snapshot and prints JSON.

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use growlab_core::{now_timestamp, AccountId, LabError, Timestamp, TxReference};
use growlab_node::config::LoggingSettings;
use growlab_node::{BlockfrostVerifier, LabConfig, LabService};
use growlab_storage::LabStorage;

#[derive(Parser)]
#[command(name = "growlab")]
#[command(version)]
#[command(about = "GrowLab - halving emission labs with payment-gated activation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "growlab.toml")]
    config: PathBuf,

    /// Evaluate at this Unix timestamp instead of the wall clock
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the emission schedule
    Schedule {
        /// Timestamp to evaluate (defaults to now)
        #[arg(long)]
        at: Option<Timestamp>,

        /// Number of eras to list
        #[arg(long, default_value = "6")]
        eras: u64,
    },

    /// Activate a lab
    Activate {
        /// Wallet address
        id: String,

        /// Payment transaction hash (not needed for the treasury)
        #[arg(long)]
        tx: Option<String>,
    },

    /// Claim pending rewards
    Claim {
        /// Wallet address
        id: String,
    },

    /// Show a lab's state
    State {
        /// Wallet address
        id: String,
    },

    /// Open a booster pack
    Booster {
        /// Wallet address
        id: String,

        /// Payment transaction hash
        #[arg(long)]
        tx: String,
    },

    /// Top labs by claimed rewards
    Leaderboard {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Network statistics
    Stats,

    /// Treasury-only views
    Admin {
        #[command(subcommand)]
        view: AdminCommands,
    },

    /// Print the effective configuration
    Config,

    /// Print Prometheus metrics (gauges reflect the stored state)
    Metrics,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Dashboard totals
    Stats(AdminArgs),
    /// Every lab
    Users(AdminArgs),
    /// Every payment
    Payments(AdminArgs),
}

#[derive(Args)]
struct AdminArgs {
    /// Caller address; must be the treasury
    #[arg(long = "as", value_name = "ADDRESS")]
    caller: String,
}

fn init_logging(verbose: bool, settings: &LoggingSettings) {
    let default_level = if verbose { "debug" } else { settings.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = settings.format == "json";

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr)
        }))
        .init();
}

fn print(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Every transition commits the snapshot itself, so callers never flush.
/// The storage lock is held until the returned service is dropped.
fn open_service(config: &LabConfig) -> anyhow::Result<LabService> {
    config.validate()?;
    let storage = Arc::new(LabStorage::open(&config.storage.data_file)?);
    let verifier = Arc::new(BlockfrostVerifier::new(&config.verifier)?);
    Ok(LabService::new(config, storage, verifier)?)
}

async fn run(cli: Cli, config: LabConfig) -> anyhow::Result<()> {
    let now = cli.now.unwrap_or_else(now_timestamp);

    match cli.command {
        Commands::Schedule { at, eras } => {
            let schedule = config.schedule()?;
            let at = at.unwrap_or(now);
            let eras: Vec<_> = (0..eras).map(|era| schedule.era_info(era)).collect();
            print(&json!({
                "genesis_time": schedule.genesis_time(),
                "initial_rate": schedule.initial_rate().to_string(),
                "halving_interval_secs": schedule.halving_interval(),
                "at": at,
                "era": schedule.era_at(at),
                "rate": schedule.rate_at(at).to_string(),
                "next_halving_at": schedule.next_boundary_after(at),
                "eras": eras,
            }))?;
        }

        Commands::Config => {
            for problem in config.problems() {
                tracing::warn!("{}", problem);
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Activate { id, tx } => {
            let lab = open_service(&config)?;
            let id = AccountId::parse(&id)?;
            let tx = tx.as_deref().map(TxReference::parse).transpose()?;
            print(&lab.activate(&id, now, tx.as_ref()).await?)?;
        }

        Commands::Claim { id } => {
            let lab = open_service(&config)?;
            print(&lab.claim(&AccountId::parse(&id)?, now)?)?;
        }

        Commands::State { id } => {
            let lab = open_service(&config)?;
            print(&lab.query_state(&AccountId::parse(&id)?, now)?)?;
        }

        Commands::Booster { id, tx } => {
            let lab = open_service(&config)?;
            let id = AccountId::parse(&id)?;
            let tx = TxReference::parse(&tx)?;
            let opening = lab
                .open_booster(&id, now, &tx, &mut rand::thread_rng())
                .await?;
            tracing::info!(
                "{} Pack! +{} Grow Power",
                opening.pack.rarity,
                opening.pack.power_bonus
            );
            print(&opening)?;
        }

        Commands::Leaderboard { limit } => {
            let lab = open_service(&config)?;
            print(&lab.leaderboard(limit))?;
        }

        Commands::Stats => {
            let lab = open_service(&config)?;
            print(&lab.network_stats(now))?;
        }

        Commands::Admin { view } => {
            let lab = open_service(&config)?;
            match view {
                AdminCommands::Stats(args) => {
                    print(&lab.admin_stats(&AccountId::parse(&args.caller)?, now)?)?
                }
                AdminCommands::Users(args) => {
                    print(&lab.admin_users(&AccountId::parse(&args.caller)?, now)?)?
                }
                AdminCommands::Payments(args) => {
                    print(&lab.admin_payments(&AccountId::parse(&args.caller)?)?)?
                }
            }
        }

        Commands::Metrics => {
            let lab = open_service(&config)?;
            match lab.export_metrics()? {
                Some(text) => print!("{text}"),
                None => anyhow::bail!("metrics are disabled (metrics.enabled = false)"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = LabConfig::load(Some(cli.config.as_path()))?;
    init_logging(cli.verbose, &config.logging);

    if let Err(err) = run(cli, config).await {
        if let Some(lab_err) = err.downcast_ref::<LabError>() {
            tracing::warn!(code = lab_err.code(), kind = ?lab_err.kind(), "{}", lab_err);
            print(&json!({
                "error": lab_err.to_string(),
                "code": lab_err.code(),
                "retryable": lab_err.is_retryable(),
            }))?;
            std::process::exit(1);
        }
        return Err(err);
    }

    Ok(())
}
