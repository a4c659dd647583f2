//! NAV unification mart. Fully recomputes two derived views from the
//! per-source NAV staging tables and the FX table: a row-wise union in a
//! common shape, and its conversion into the target currency. The build
//! is a pure transform over store contents and safe to re-run.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::category::{Category, Source};
use crate::currency::to_fx_currency;
use crate::store::StagingStore;

pub const UNIFIED_VIEW: &str = "mart_nav_unified";
pub const CONVERTED_VIEW: &str = "mart_nav_usd";

/// One NAV fact in the unified shape. The same ticker may legitimately
/// appear once per source; no cross-source dedup happens here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavMartRow {
    pub source: String,
    pub ticker: String,
    pub name: Option<String>,
    pub nav_price: Decimal,
    pub currency: String,
    pub as_of_date: NaiveDate,
    pub scrape_date: NaiveDate,
    pub url: Option<String>,
}

/// A unified row joined against the FX table at the exact as-of date.
/// `nav_price_usd` is null when no rate exists for that date; there is
/// no fallback to a nearby date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavConvertedRow {
    #[serde(flatten)]
    pub nav: NavMartRow,
    pub fx_currency: String,
    pub unit_factor: Decimal,
    pub fx_rate: Option<Decimal>,
    pub nav_price_usd: Option<Decimal>,
}

#[derive(Debug)]
pub struct MartReport {
    pub unified_rows: usize,
    pub converted_rows: usize,
    pub fx_gaps: usize,
}

pub struct MartBuilder<'a> {
    store: &'a dyn StagingStore,
    target_currency: String,
}

impl<'a> MartBuilder<'a> {
    pub fn new(store: &'a dyn StagingStore, target_currency: &str) -> Self {
        MartBuilder {
            store,
            target_currency: target_currency.to_uppercase(),
        }
    }

    pub async fn build(&self) -> Result<MartReport> {
        let unified = self.build_unified().await?;
        let unified_rows = unified.len();

        let mut serialized = Vec::with_capacity(unified.len());
        for row in &unified {
            serialized.push((view_key(row), serde_json::to_vec(row)?));
        }
        self.store.replace_view(UNIFIED_VIEW, serialized).await?;

        let mut converted = Vec::with_capacity(unified.len());
        let mut fx_gaps = 0;
        for nav in unified {
            let row = self.convert(nav).await?;
            if row.nav_price_usd.is_none() {
                fx_gaps += 1;
            }
            converted.push((view_key(&row.nav), serde_json::to_vec(&row)?));
        }
        let converted_rows = converted.len();
        self.store.replace_view(CONVERTED_VIEW, converted).await?;

        info!(
            "Mart rebuilt: unified={} converted={} fx_gaps={}",
            unified_rows, converted_rows, fx_gaps
        );
        Ok(MartReport {
            unified_rows,
            converted_rows,
            fx_gaps,
        })
    }

    async fn build_unified(&self) -> Result<Vec<NavMartRow>> {
        let mut unified = Vec::new();
        for source in Source::ALL {
            // Master staging fills in names and URLs the NAV rows lack.
            let masters: HashMap<String, (Option<String>, Option<String>)> = self
                .store
                .scan(&Category::MasterTicker.staging_table(source))
                .await?
                .into_iter()
                .map(|row| (row.ticker.clone(), (row.name, row.url)))
                .collect();

            let nav_table = Category::DailyNav.staging_table(source);
            for row in self.store.scan(&nav_table).await? {
                // Validated NAV rows always carry price, currency and date;
                // anything else in the table is skipped, not guessed at.
                let (Some(nav_price), Some(currency), Some(as_of_date)) =
                    (row.nav_price, row.currency, row.as_of_date)
                else {
                    debug!(table = %nav_table, key = %row.key, "Skipping incomplete NAV row");
                    continue;
                };
                let master = masters.get(&row.ticker);
                unified.push(NavMartRow {
                    source: source.label().to_string(),
                    ticker: row.ticker,
                    name: row.name.or_else(|| master.and_then(|m| m.0.clone())),
                    nav_price,
                    currency,
                    as_of_date,
                    scrape_date: row.scrape_date,
                    url: row.url.or_else(|| master.and_then(|m| m.1.clone())),
                });
            }
        }
        unified.sort_by(|a, b| {
            (&a.source, &a.ticker, a.as_of_date).cmp(&(&b.source, &b.ticker, b.as_of_date))
        });
        Ok(unified)
    }

    async fn convert(&self, nav: NavMartRow) -> Result<NavConvertedRow> {
        let (fx_currency, unit_factor) = to_fx_currency(&nav.currency);

        let (fx_rate, nav_price_usd) = if fx_currency == self.target_currency {
            (None, Some(nav.nav_price * unit_factor))
        } else {
            match self
                .store
                .get_fx(nav.as_of_date, &fx_currency, &self.target_currency)
                .await?
            {
                Some(rate) => {
                    let converted = nav.nav_price * unit_factor * rate.fx_rate;
                    (Some(rate.fx_rate), Some(converted))
                }
                None => (None, None),
            }
        };

        Ok(NavConvertedRow {
            nav,
            fx_currency,
            unit_factor,
            fx_rate,
            nav_price_usd,
        })
    }
}

fn view_key(row: &NavMartRow) -> String {
    format!("{}|{}|{}", row.source, row.ticker, row.as_of_date)
}
