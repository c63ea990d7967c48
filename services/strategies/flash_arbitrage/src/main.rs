//! Ouro runtime binary
//!
//! ```text
//! ouro --config ouro.toml run
//! ouro --config ouro.toml --dry-run run
//! ouro --config ouro.toml check
//! ouro defaults > ouro.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::ConfigLoader;
use flash_arbitrage::{StrategyConfig, StrategyEngine};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ouro")]
#[command(about = "Multi-venue AMM cycle arbitrage engine")]
struct Args {
    /// TOML configuration file; OURO_* environment variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Overlay environments/<name>.toml next to the config file
    #[arg(long)]
    environment: Option<String>,

    /// In-memory chain and scripted relay; nothing is sent anywhere
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON objects
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine until interrupted (default)
    Run,
    /// Load and validate the configuration, then exit
    Check,
    /// Print the default configuration as TOML
    Defaults,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<StrategyConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }
    if let Some(environment) = &args.environment {
        loader = loader.with_environment(environment);
    }
    loader.load(&StrategyConfig::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    match args.command.as_ref().unwrap_or(&Command::Run) {
        Command::Defaults => {
            let text = toml::to_string_pretty(&StrategyConfig::default())
                .context("Failed to render default configuration")?;
            println!("{text}");
            Ok(())
        }
        Command::Check => {
            let config = load_config(&args)?;
            info!(
                "✅ Configuration valid: {} assets, {} venues, {} feeds, {} relays",
                config.markets.assets.len(),
                config.markets.venues.len(),
                config.feeds.len(),
                config.relays.endpoints.len()
            );
            Ok(())
        }
        Command::Run => run(&args).await,
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let engine = if args.dry_run {
        warn!("Dry run: no transaction leaves this process");
        StrategyEngine::dry_run(config)?
    } else {
        StrategyEngine::new(config)?
    };

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = stop.send(true);
        }
    });

    let report = engine.run(shutdown).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render engine report")?
    );
    Ok(())
}
