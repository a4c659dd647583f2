//! Concrete source adapters. Each wraps one site's JSON export endpoint
//! and maps its rows into `SourceRecord`s; DOM scraping lives outside
//! this crate.

pub mod financial_times;
pub mod stock_analysis;
pub mod yahoo_finance;
