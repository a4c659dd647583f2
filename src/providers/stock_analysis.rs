use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::adapter::{FetchContext, SourceAdapter};
use crate::category::{Category, Source};
use crate::record::SourceRecord;

/// Adapter for the Stock Analysis export API. Returns a bare JSON array;
/// sector and country breakdowns both arrive through the sector-region
/// export with an explicit `dimension` column.
pub struct StockAnalysisAdapter {
    base_url: String,
}

impl StockAnalysisAdapter {
    pub fn new(base_url: &str) -> Self {
        StockAnalysisAdapter {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SaExportRow {
    ticker: Option<String>,
    name: Option<String>,
    as_of_date: Option<NaiveDate>,
    nav_price: Option<Decimal>,
    currency: Option<String>,
    holding_name: Option<String>,
    weight_pct: Option<Decimal>,
    dimension: Option<String>,
    label: Option<String>,
    detail: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl SourceAdapter for StockAnalysisAdapter {
    fn source(&self) -> Source {
        Source::StockAnalysis
    }

    #[instrument(name = "StockAnalysisFetch", skip(self, ctx), fields(category = %category))]
    async fn fetch(&self, category: Category, ctx: &FetchContext) -> Result<Vec<SourceRecord>> {
        let url = format!("{}/api/export/{}", self.base_url, category.slug());
        debug!("Requesting export from {}", url);

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
                "Stock Analysis export returned {} for category: {}",
                response.status(),
                category
            ));
        }

        let rows: Vec<SaExportRow> = response.json().await.with_context(|| {
            format!("Failed to parse Stock Analysis export for category: {category}")
        })?;

        debug!(rows = rows.len(), "Received Stock Analysis export rows");
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut record = SourceRecord::new(Source::StockAnalysis, ctx.scrape_date);
                record.ticker = row.ticker;
                record.name = row.name;
                record.as_of_date = row.as_of_date;
                record.nav_price = row.nav_price;
                record.currency = row.currency;
                record.holding_name = row.holding_name;
                record.weight_pct = row.weight_pct;
                record.dimension = row.dimension;
                record.label = row.label;
                record.detail = row.detail;
                record.url = row.url;
                record
            })
            .collect())
    }
}
