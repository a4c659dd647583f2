//! The closed set of data sources and run-categories and their
//! per-category staging contracts (table names, natural keys, gating).

use crate::record::SourceRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External data providers the pipeline ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    FinancialTimes,
    YahooFinance,
    StockAnalysis,
}

impl Source {
    pub const ALL: [Source; 3] = [
        Source::FinancialTimes,
        Source::YahooFinance,
        Source::StockAnalysis,
    ];

    /// Short prefix used in staging table names, e.g. `stg_ft_daily_nav`.
    pub fn table_prefix(&self) -> &'static str {
        match self {
            Source::FinancialTimes => "ft",
            Source::YahooFinance => "yf",
            Source::StockAnalysis => "sa",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Source::FinancialTimes => "Financial Times",
            Source::YahooFinance => "Yahoo Finance",
            Source::StockAnalysis => "Stock Analysis",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One logical data domain with its own staging tables and natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    MasterTicker,
    DailyNav,
    StaticDetail,
    Holdings,
    SectorRegion,
}

impl Category {
    /// Fixed execution order: master tickers first so downstream joins see
    /// a fresh ticker list, weekly-gated categories last.
    pub const PIPELINE_ORDER: [Category; 5] = [
        Category::MasterTicker,
        Category::DailyNav,
        Category::StaticDetail,
        Category::Holdings,
        Category::SectorRegion,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Category::MasterTicker => "master-ticker",
            Category::DailyNav => "daily-nav",
            Category::StaticDetail => "static-detail",
            Category::Holdings => "holdings",
            Category::SectorRegion => "sector-region",
        }
    }

    fn table_suffix(&self) -> &'static str {
        match self {
            Category::MasterTicker => "master_ticker",
            Category::DailyNav => "daily_nav",
            Category::StaticDetail => "static_detail",
            Category::Holdings => "holdings",
            Category::SectorRegion => "sector_region",
        }
    }

    /// Name of the staging table for this category and source.
    pub fn staging_table(&self, source: Source) -> String {
        format!("stg_{}_{}", source.table_prefix(), self.table_suffix())
    }

    /// Weekly categories only run on market-closed days unless forced.
    pub fn market_closed_gated(&self) -> bool {
        matches!(self, Category::Holdings | Category::SectorRegion)
    }

    /// Builds the natural key for a normalized record, or `None` when a
    /// key component is missing. Key shapes mirror the staging tables'
    /// unique constraints.
    pub fn natural_key(&self, record: &SourceRecord) -> Option<String> {
        let ticker = record.ticker.as_deref()?;
        match self {
            Category::MasterTicker => Some(ticker.to_string()),
            Category::DailyNav => {
                let as_of = record.as_of_date?;
                Some(format!("{ticker}|{as_of}"))
            }
            Category::StaticDetail => Some(format!("{ticker}|{}", record.scrape_date)),
            Category::Holdings => {
                let holding = record.holding_name.as_deref()?;
                Some(format!("{ticker}|{holding}|{}", record.scrape_date))
            }
            Category::SectorRegion => {
                let dimension = record.dimension.as_deref()?;
                let label = record.label.as_deref()?;
                Some(format!(
                    "{ticker}|{dimension}|{label}|{}",
                    record.scrape_date
                ))
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
