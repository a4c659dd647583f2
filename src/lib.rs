pub mod adapter;
pub mod calendar;
pub mod category;
pub mod config;
pub mod currency;
pub mod fx;
pub mod log;
pub mod mart;
pub mod pipeline;
pub mod providers;
pub mod record;
pub mod store;
pub mod ui;
pub mod validator;

use crate::adapter::SourceAdapter;
use crate::fx::{FrankfurterProvider, FxService};
use crate::mart::MartBuilder;
use crate::pipeline::{CategoryToggle, Pipeline, RunOptions};
use crate::store::FjallStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub enum AppCommand {
    /// Ingest all configured categories into staging.
    Run { force_weekly: bool },
    /// Backfill daily FX rates for the trailing window.
    FxBackfill { days: Option<u32> },
    /// Recompute the unified and converted NAV views.
    BuildMart,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Fund staging pipeline starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = FjallStore::open(&config.data_path()?)?;

    match command {
        AppCommand::Run { force_weekly } => {
            let adapters = build_adapters(&config);
            let timezone = config.market_timezone()?;
            let today = calendar::today_in(timezone);

            let toggle = |c: config::CategoryConfig, gated: bool| CategoryToggle {
                enabled: c.enabled,
                force: c.force || (gated && force_weekly),
            };
            let options = RunOptions {
                master_ticker: toggle(config.categories.master_ticker, false),
                daily_nav: toggle(config.categories.daily_nav, false),
                static_detail: toggle(config.categories.static_detail, false),
                holdings: toggle(config.categories.holdings, true),
                sector_region: toggle(config.categories.sector_region, true),
                today,
            };

            let pipeline = Pipeline::new(adapters, &store);
            let report = pipeline.run(&options, true).await;
            println!("{}", report.display_as_table());
        }
        AppCommand::FxBackfill { days } => {
            let provider = FrankfurterProvider::new(&config.fx.base_url);
            let service = FxService::new(&store, &provider, &config.target_currency);
            let timezone = config.market_timezone()?;
            let today = calendar::today_in(timezone);
            let window_days = days.unwrap_or(config.fx.window_days);

            let report = service.backfill(window_days, today).await?;
            println!(
                "FX backfill {} -> {} ({} currencies): {} inserted, {} updated, {} gaps, {} errors",
                report.start,
                report.end,
                report.currencies.len(),
                report.inserted,
                report.updated,
                report.gaps,
                report.fetch_errors
            );
        }
        AppCommand::BuildMart => {
            let builder = MartBuilder::new(&store, &config.target_currency);
            let report = builder.build().await?;
            println!(
                "Mart rebuilt: {} unified rows, {} converted rows, {} FX gaps",
                report.unified_rows, report.converted_rows, report.fx_gaps
            );
        }
    }

    Ok(())
}

fn build_adapters(config: &config::AppConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if let Some(site) = &config.providers.financial_times {
        adapters.push(Arc::new(providers::financial_times::FinancialTimesAdapter::new(
            &site.base_url,
        )));
    }
    if let Some(site) = &config.providers.yahoo_finance {
        adapters.push(Arc::new(providers::yahoo_finance::YahooFundAdapter::new(
            &site.base_url,
        )));
    }
    if let Some(site) = &config.providers.stock_analysis {
        adapters.push(Arc::new(providers::stock_analysis::StockAnalysisAdapter::new(
            &site.base_url,
        )));
    }
    adapters
}
