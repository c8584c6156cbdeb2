//! CLI entrypoint: loads layered configuration, wires the exchange client,
//! scoreboard client, and Position Store, then runs the orchestrator until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kalshi_trader::adapters::postgres::PostgresStore;
use kalshi_trader::config::AppConfig;
use kalshi_trader::coordination::shutdown::install_signal_handlers;
use kalshi_trader::error::Result;
use kalshi_trader::exchange::build_exchange_client;
use kalshi_trader::scoreboard::EspnScoreboardClient;
use kalshi_trader::strategy::KillSwitchTrigger;
use kalshi_trader::Orchestrator;

#[derive(Parser)]
#[command(name = "kalshi-trader", about = "Automated Kalshi sports-market trading orchestrator")]
struct Cli {
    /// Directory holding config.toml (defaults to ./config)
    #[arg(long, global = true, env = "TRADER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator for one user until SIGTERM/SIGINT.
    Run {
        /// Overrides AppConfig.user_id from the config file.
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the current orchestrator/kill-switch status for a user and exit.
    Status {
        #[arg(long)]
        user: Option<String>,
    },
    /// Manually trip or reset the kill switch for a user without starting
    /// the trading loops.
    KillSwitch {
        #[arg(long)]
        user: Option<String>,
        #[command(subcommand)]
        action: KillSwitchAction,
    },
}

#[derive(Subcommand)]
enum KillSwitchAction {
    /// Trip the kill switch and unwind every open position at a discount.
    Trip,
    /// Clear a previous trip so trading can resume.
    Reset,
}

fn init_tracing(logging: &kalshi_trader::config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let loaded = match &cli.config_dir {
        Some(dir) => AppConfig::load_from(dir),
        None => AppConfig::load(),
    };
    Ok(loaded?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_tracing(&config.logging);

    match cli.command {
        Command::Run { user } => {
            if let Some(user) = user {
                config.user_id = user;
            }
            run(config).await?;
        }
        Command::Status { user } => {
            if let Some(user) = user {
                config.user_id = user;
            }
            status(config).await?;
        }
        Command::KillSwitch { user, action } => {
            if let Some(user) = user {
                config.user_id = user;
            }
            kill_switch(config, action).await?;
        }
    }
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let store = Arc::new(PostgresStore::new(&config.database.url, config.database.max_connections).await?);
    let exchange = build_exchange_client(&config, config.dry_run)?;
    let scoreboard = Arc::new(EspnScoreboardClient::new(
        Some(config.scoreboard.base_url.clone()),
        config.scoreboard.college_group_ids.clone(),
    ));

    let orchestrator = Orchestrator::with_defaults(config.user_id.clone(), config, exchange, scoreboard, store);

    orchestrator.initialize().await?;
    orchestrator.start().await?;

    let shutdown = orchestrator.shutdown_handle();
    install_signal_handlers(shutdown.clone()).await;
    let mut signals = shutdown.subscribe();
    let _ = signals.recv().await;

    orchestrator.stop().await?;
    Ok(())
}

async fn kill_switch(config: AppConfig, action: KillSwitchAction) -> Result<()> {
    let store = Arc::new(PostgresStore::new(&config.database.url, config.database.max_connections).await?);
    let exchange = build_exchange_client(&config, config.dry_run)?;
    let scoreboard = Arc::new(EspnScoreboardClient::new(
        Some(config.scoreboard.base_url.clone()),
        config.scoreboard.college_group_ids.clone(),
    ));

    let orchestrator = Orchestrator::with_defaults(config.user_id.clone(), config, exchange, scoreboard, store);
    orchestrator.initialize().await?;

    match action {
        KillSwitchAction::Trip => {
            orchestrator.trip_kill_switch(KillSwitchTrigger::Manual).await?;
            println!("kill switch tripped manually, open positions unwound");
        }
        KillSwitchAction::Reset => {
            orchestrator.reset_kill_switch().await?;
            println!("kill switch reset");
        }
    }
    Ok(())
}

async fn status(config: AppConfig) -> Result<()> {
    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    let positions = store.get_open_positions(&config.user_id).await?;
    let kill_switch = store.get_kill_switch_state(&config.user_id).await?;

    println!("user:           {}", config.user_id);
    println!("bot_enabled:    {}", config.global.bot_enabled);
    println!("open positions: {}", positions.len());
    match kill_switch {
        Some((at, reason)) => println!("kill switch:    TRIPPED at {at} ({reason})"),
        None => println!("kill switch:    clear"),
    }
    Ok(())
}
