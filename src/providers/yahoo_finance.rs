use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::adapter::{FetchContext, SourceAdapter};
use crate::category::{Category, Source};
use crate::record::SourceRecord;

// YahooFundAdapter implementation for SourceAdapter
pub struct YahooFundAdapter {
    base_url: String,
}

impl YahooFundAdapter {
    pub fn new(base_url: &str) -> Self {
        YahooFundAdapter {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YahooExportResponse {
    export: YahooExportResult,
}

#[derive(Debug, Deserialize)]
struct YahooExportResult {
    result: Vec<YahooExportRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YahooExportRow {
    ticker: Option<String>,
    #[serde(alias = "shortName")]
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
impl SourceAdapter for YahooFundAdapter {
    fn source(&self) -> Source {
        Source::YahooFinance
    }

    #[instrument(name = "YahooFetch", skip(self, ctx), fields(category = %category))]
    async fn fetch(&self, category: Category, ctx: &FetchContext) -> Result<Vec<SourceRecord>> {
        let url = format!("{}/v8/fund/export/{}", self.base_url, category.slug());
        debug!("Requesting fund export from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("fundstage/1.0")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for category: {} URL: {}", e, category, url))?
            .error_for_status()
            .map_err(|e| anyhow!("Yahoo export failed for category {}: {}", category, e))?;

        let data = response.json::<YahooExportResponse>().await?;

        debug!(rows = data.export.result.len(), "Received Yahoo export rows");
        Ok(data
            .export
            .result
            .into_iter()
            .map(|row| {
                let mut record = SourceRecord::new(Source::YahooFinance, ctx.scrape_date);
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> FetchContext {
        FetchContext {
            scrape_date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fetch_holdings_rows() {
        let server = MockServer::start().await;
        let body = r#"{
            "export": {
                "result": [
                    {
                        "ticker": "VTI",
                        "holding_name": "Apple Inc",
                        "weight_pct": 6.2
                    },
                    {
                        "ticker": "VTI",
                        "holding_name": "Microsoft Corp",
                        "weight_pct": 5.8
                    }
                ]
            }
        }"#;
        Mock::given(method("GET"))
            .and(path("/v8/fund/export/holdings"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = YahooFundAdapter::new(&server.uri());
        let records = adapter.fetch(Category::Holdings, &ctx()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].holding_name.as_deref(), Some("Apple Inc"));
        assert_eq!(records[1].weight_pct, Some(dec!(5.8)));
    }

    #[tokio::test]
    async fn test_short_name_alias() {
        let server = MockServer::start().await;
        let body = r#"{
            "export": {
                "result": [
                    {"ticker": "VTI", "shortName": "Vanguard Total Stock Market ETF"}
                ]
            }
        }"#;
        Mock::given(method("GET"))
            .and(path("/v8/fund/export/master-ticker"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = YahooFundAdapter::new(&server.uri());
        let records = adapter.fetch(Category::MasterTicker, &ctx()).await.unwrap();
        assert_eq!(
            records[0].name.as_deref(),
            Some("Vanguard Total Stock Market ETF")
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/fund/export/daily-nav"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
            .mount(&server)
            .await;

        let adapter = YahooFundAdapter::new(&server.uri());
        assert!(adapter.fetch(Category::DailyNav, &ctx()).await.is_err());
    }
}
