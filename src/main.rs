use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundstage::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Ingest configured categories into staging
    Run {
        /// Run weekly categories even if the market is open today
        #[arg(long)]
        force_weekly: bool,
    },
    /// Backfill daily FX rates for the trailing window
    Fx {
        /// Override the configured backfill window
        #[arg(long)]
        days: Option<u32>,
    },
    /// Rebuild the unified and converted NAV views
    Mart,
}

impl From<Commands> for fundstage::AppCommand {
    fn from(cmd: Commands) -> fundstage::AppCommand {
        match cmd {
            Commands::Run { force_weekly } => fundstage::AppCommand::Run { force_weekly },
            Commands::Fx { days } => fundstage::AppCommand::FxBackfill { days },
            Commands::Mart => fundstage::AppCommand::BuildMart,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fundstage::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = fundstage::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
timezone: "Europe/London"
target_currency: "USD"

providers:
  financial_times:
    base_url: "https://markets.ft.com"
  yahoo_finance:
    base_url: "https://query1.finance.yahoo.com"
  stock_analysis:
    base_url: "https://stockanalysis.com"

categories:
  master_ticker: { enabled: true }
  daily_nav: { enabled: true }
  static_detail: { enabled: true }
  holdings: { enabled: true, force: false }
  sector_region: { enabled: true, force: false }

fx:
  base_url: "https://api.frankfurter.app"
  window_days: 90
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
