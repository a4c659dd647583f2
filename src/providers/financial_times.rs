use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::adapter::{FetchContext, SourceAdapter};
use crate::category::{Category, Source};
use crate::record::SourceRecord;

/// Adapter for the Financial Times funds export. FT identifies funds by
/// its own `ft_ticker` symbol, which we prefer over the exchange ticker
/// when both are present.
pub struct FinancialTimesAdapter {
    base_url: String,
}

impl FinancialTimesAdapter {
    pub fn new(base_url: &str) -> Self {
        FinancialTimesAdapter {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FtExportResponse {
    rows: Vec<FtExportRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FtExportRow {
    ft_ticker: Option<String>,
    ticker: Option<String>,
    name: Option<String>,
    nav_price: Option<Decimal>,
    nav_currency: Option<String>,
    nav_as_of: Option<NaiveDate>,
    holding_name: Option<String>,
    weight_pct: Option<Decimal>,
    dimension: Option<String>,
    label: Option<String>,
    detail: Option<String>,
    url: Option<String>,
}

impl FtExportRow {
    fn into_record(self, ctx: &FetchContext) -> SourceRecord {
        let mut record = SourceRecord::new(Source::FinancialTimes, ctx.scrape_date);
        record.ticker = self.ft_ticker.or(self.ticker);
        record.name = self.name;
        record.as_of_date = self.nav_as_of;
        record.nav_price = self.nav_price;
        record.currency = self.nav_currency;
        record.holding_name = self.holding_name;
        record.weight_pct = self.weight_pct;
        record.dimension = self.dimension;
        record.label = self.label;
        record.detail = self.detail;
        record.url = self.url;
        record
    }
}

#[async_trait]
impl SourceAdapter for FinancialTimesAdapter {
    fn source(&self) -> Source {
        Source::FinancialTimes
    }

    #[instrument(name = "FtFetch", skip(self, ctx), fields(category = %category))]
    async fn fetch(&self, category: Category, ctx: &FetchContext) -> Result<Vec<SourceRecord>> {
        let url = format!("{}/funds/export/{}.json", self.base_url, category.slug());
        debug!("Requesting FT export from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("fundstage/1.0")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for category: {} URL: {}", e, category, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "FT export returned {} for category: {}",
                response.status(),
                category
            ));
        }

        let data: FtExportResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse FT export for category: {category}"))?;

        debug!(rows = data.rows.len(), "Received FT export rows");
        Ok(data
            .rows
            .into_iter()
            .map(|row| row.into_record(ctx))
            .collect())
    }
}
