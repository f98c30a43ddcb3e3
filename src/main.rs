use anyhow::{bail, Context};
use augur::config::AppConfig;
use augur::coordinator::ShutdownOutcome;
use augur::ml::KeywordSentimentScorer;
use augur::strategy::builtin_strategies;
use augur::TradingEngine;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod main_runtime;

use main_runtime::{
    build_gateway, build_repository, init_logging, init_logging_simple, shutdown_signal,
};

#[derive(Parser)]
#[command(name = "augur")]
#[command(version)]
#[command(about = "Prediction-market trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding default.toml and <AUGUR_ENV>.toml
    #[arg(short, long, default_value = "config", env = "AUGUR_CONFIG_DIR")]
    config_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop until Ctrl-C
    Run {
        /// Trade against the in-memory paper book instead of Kalshi
        #[arg(long)]
        paper: bool,
    },
    /// Print the current risk report as JSON
    RiskReport,
    /// Print the 30-day performance summary as JSON
    Performance,
    /// Apply database migrations
    Migrate,
}

fn load_config(dir: &PathBuf) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load_from(dir)
        .with_context(|| format!("failed to load configuration from {}", dir.display()))?;
    if let Err(errors) = config.validate() {
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(config)
}

async fn build_engine(config: &AppConfig, paper: bool) -> anyhow::Result<TradingEngine> {
    let repository = build_repository(config).await?;
    let gateway = build_gateway(config, paper, repository.clone())?;
    let strategies = builtin_strategies(
        config,
        repository.clone(),
        Arc::new(KeywordSentimentScorer::new()),
    );
    Ok(TradingEngine::new(config, gateway, repository, strategies)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config_dir)?;

    match cli.command {
        Commands::Run { paper } => {
            init_logging(&config.logging);
            run(&config, paper).await?;
        }
        Commands::RiskReport => {
            init_logging_simple();
            let engine = build_engine(&config, true).await?;
            let report = engine.risk_report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Performance => {
            init_logging_simple();
            let engine = build_engine(&config, true).await?;
            let summary = engine.performance_summary().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Migrate => {
            init_logging_simple();
            let Some(url) = config.database.url.as_deref() else {
                bail!("database.url is not set");
            };
            let store =
                augur::adapters::PostgresRepository::new(url, config.database.max_connections)
                    .await?;
            store.migrate().await?;
            println!("Migrations applied");
        }
    }

    Ok(())
}

async fn run(config: &AppConfig, paper: bool) -> anyhow::Result<()> {
    info!(
        bankroll = %config.trading.bankroll,
        paper,
        dry_run = config.engine.dry_run,
        "Starting augur"
    );

    let engine = build_engine(config, paper).await?;
    engine.start().await.context("engine failed to start")?;

    shutdown_signal().await;
    info!("Shutdown signal received");

    match engine.stop().await {
        ShutdownOutcome::Abandoned => {
            warn!("Trading loop abandoned after join timeout; an in-flight cycle may be incomplete")
        }
        outcome => info!(?outcome, "Engine stopped"),
    }

    let status = engine.get_status().await;
    info!(
        cycles = status.execution_count,
        errors = status.error_count,
        trades_today = status.total_trades_today,
        "Final status"
    );
    Ok(())
}
