//! Daily FX rate backfill. Rates come from an external provider one
//! (date, pair) at a time and are upserted under the same idempotent
//! contract as staging rows. A date the provider cannot answer for is a
//! gap, never an error: the mart leaves those conversions null.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::category::{Category, Source};
use crate::currency::{is_placeholder, to_fx_currency};
use crate::record::FxRate;
use crate::store::{StagingStore, UpsertOutcome};

/// Currencies always backfilled in addition to whatever staging holds.
const SEED_CURRENCIES: [&str; 12] = [
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "HKD", "SGD", "THB", "CNY", "INR",
];

#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Conversion rate on one civil date. `Ok(None)` means the provider
    /// has no observation for exactly that date.
    async fn get_rate(&self, date: NaiveDate, from: &str, to: &str) -> Result<Option<Decimal>>;

    /// Provider label stored alongside each rate for provenance.
    fn label(&self) -> &str;
}

// FrankfurterProvider implementation for FxRateProvider
pub struct FrankfurterProvider {
    base_url: String,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str) -> Self {
        FrankfurterProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    date: NaiveDate,
    #[serde(default)]
    rates: std::collections::HashMap<String, Decimal>,
}

#[async_trait]
impl FxRateProvider for FrankfurterProvider {
    async fn get_rate(&self, date: NaiveDate, from: &str, to: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/{}", self.base_url, date);
        debug!("Requesting FX rate from {} ({} -> {})", url, from, to);

        let client = reqwest::Client::builder()
            .user_agent("fundstage/1.0")
            .build()?;
        let response = client
            .get(&url)
            .query(&[("from", from), ("to", to)])
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for FX date {} URL: {}", e, date, url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("FX provider failed for {from}->{to} on {date}"))?;

        let payload: FrankfurterResponse = response.json().await?;

        // The provider answers weekend/holiday queries with the previous
        // business day's fixing. The contract here is one rate per exact
        // date with no fallback, so a shifted date counts as absent.
        if payload.date != date {
            debug!(requested = %date, answered = %payload.date, "FX date shifted, treating as gap");
            return Ok(None);
        }
        Ok(payload.rates.get(to).copied())
    }

    fn label(&self) -> &str {
        "frankfurter"
    }
}

#[derive(Debug)]
pub struct FxBackfillReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub currencies: Vec<String>,
    pub inserted: usize,
    pub updated: usize,
    pub gaps: usize,
    pub fetch_errors: usize,
}

pub struct FxService<'a> {
    store: &'a dyn StagingStore,
    provider: &'a dyn FxRateProvider,
    target_currency: String,
}

impl<'a> FxService<'a> {
    pub fn new(
        store: &'a dyn StagingStore,
        provider: &'a dyn FxRateProvider,
        target_currency: &str,
    ) -> Self {
        FxService {
            store,
            provider,
            target_currency: target_currency.to_uppercase(),
        }
    }

    /// Currencies observed in staged NAV rows, mapped to their FX
    /// currency, plus the seed set. Placeholder codes are dropped.
    async fn required_currencies(&self) -> Result<BTreeSet<String>> {
        let mut currencies: BTreeSet<String> = SEED_CURRENCIES
            .iter()
            .map(|c| c.to_string())
            .collect();
        currencies.insert(self.target_currency.clone());

        for source in Source::ALL {
            let table = Category::DailyNav.staging_table(source);
            for row in self.store.scan(&table).await? {
                if let Some(currency) = row.currency {
                    if is_placeholder(&currency) {
                        continue;
                    }
                    let (fx_currency, _) = to_fx_currency(&currency);
                    currencies.insert(fx_currency);
                }
            }
        }
        Ok(currencies)
    }

    /// Backfills the trailing window ending at `today`. Each (date, pair)
    /// is resolved independently; no interpolation across dates.
    pub async fn backfill(&self, window_days: u32, today: NaiveDate) -> Result<FxBackfillReport> {
        let currencies = self.required_currencies().await?;
        let start = today - Duration::days(window_days.saturating_sub(1) as i64);
        info!(
            "FX backfill range: {} -> {} ({} currencies)",
            start,
            today,
            currencies.len()
        );

        let mut report = FxBackfillReport {
            start,
            end: today,
            currencies: currencies.iter().cloned().collect(),
            inserted: 0,
            updated: 0,
            gaps: 0,
            fetch_errors: 0,
        };

        let mut day = start;
        while day <= today {
            // Identity rate so target-denominated rows always convert.
            self.record(&mut report, day, &self.target_currency, dec!(1))
                .await?;

            for currency in &currencies {
                if *currency == self.target_currency {
                    continue;
                }
                match self
                    .provider
                    .get_rate(day, currency, &self.target_currency)
                    .await
                {
                    Ok(Some(rate)) => {
                        self.record(&mut report, day, currency, rate).await?;
                    }
                    Ok(None) => {
                        debug!(%day, %currency, "No FX rate published, recording gap");
                        report.gaps += 1;
                    }
                    Err(e) => {
                        warn!(%day, %currency, error = %e, "FX fetch failed");
                        report.fetch_errors += 1;
                    }
                }
            }
            day += Duration::days(1);
        }

        info!(
            "FX backfill completed: inserted={} updated={} gaps={} errors={}",
            report.inserted, report.updated, report.gaps, report.fetch_errors
        );
        Ok(report)
    }

    async fn record(
        &self,
        report: &mut FxBackfillReport,
        date: NaiveDate,
        from: &str,
        rate: Decimal,
    ) -> Result<()> {
        let outcome = self
            .store
            .upsert_fx(FxRate {
                rate_date: date,
                from_currency: from.to_string(),
                to_currency: self.target_currency.clone(),
                fx_rate: rate,
                provider: self.provider.label().to_string(),
                updated_at: Utc::now(),
            })
            .await?;
        match outcome {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedRates {
        rates: HashMap<(NaiveDate, String), Decimal>,
    }

    #[async_trait]
    impl FxRateProvider for FixedRates {
        async fn get_rate(
            &self,
            date: NaiveDate,
            from: &str,
            _to: &str,
        ) -> Result<Option<Decimal>> {
            Ok(self.rates.get(&(date, from.to_string())).copied())
        }

        fn label(&self) -> &str {
            "fixed"
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_frankfurter_parses_rate() {
        let server = MockServer::start().await;
        let body = r#"{"amount":1.0,"base":"GBP","date":"2024-05-01","rates":{"USD":1.27}}"#;
        Mock::given(method("GET"))
            .and(path("/2024-05-01"))
            .and(query_param("from", "GBP"))
            .and(query_param("to", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new(&server.uri());
        let rate = provider
            .get_rate(date(2024, 5, 1), "GBP", "USD")
            .await
            .unwrap();
        assert_eq!(rate, Some(dec!(1.27)));
    }

    #[tokio::test]
    async fn test_frankfurter_shifted_date_is_a_gap() {
        let server = MockServer::start().await;
        // Saturday query answered with Friday's fixing
        let body = r#"{"amount":1.0,"base":"EUR","date":"2024-05-03","rates":{"USD":1.07}}"#;
        Mock::given(method("GET"))
            .and(path("/2024-05-04"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new(&server.uri());
        let rate = provider
            .get_rate(date(2024, 5, 4), "EUR", "USD")
            .await
            .unwrap();
        assert_eq!(rate, None);
    }

    #[tokio::test]
    async fn test_frankfurter_not_found_is_a_gap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = FrankfurterProvider::new(&server.uri());
        let rate = provider
            .get_rate(date(2024, 5, 1), "EUR", "USD")
            .await
            .unwrap();
        assert_eq!(rate, None);
    }

    #[tokio::test]
    async fn test_backfill_records_rates_and_gaps() {
        let store = MemoryStore::new();
        let mut rates = HashMap::new();
        rates.insert((date(2024, 5, 1), "GBP".to_string()), dec!(1.27));
        // No rates at all for 2024-05-02
        let provider = FixedRates { rates };

        let service = FxService::new(&store, &provider, "USD");
        let report = service.backfill(2, date(2024, 5, 2)).await.unwrap();

        assert_eq!(report.start, date(2024, 5, 1));
        let fetched = store
            .get_fx(date(2024, 5, 1), "GBP", "USD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.fx_rate, dec!(1.27));
        assert_eq!(fetched.provider, "fixed");
        assert!(report.gaps > 0);

        // Identity rate present for both days
        for day in [date(2024, 5, 1), date(2024, 5, 2)] {
            let identity = store.get_fx(day, "USD", "USD").await.unwrap().unwrap();
            assert_eq!(identity.fx_rate, dec!(1));
        }
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let store = MemoryStore::new();
        let mut rates = HashMap::new();
        rates.insert((date(2024, 5, 1), "GBP".to_string()), dec!(1.27));
        let provider = FixedRates { rates };
        let service = FxService::new(&store, &provider, "USD");

        let first = service.backfill(1, date(2024, 5, 1)).await.unwrap();
        assert!(first.inserted > 0);
        assert_eq!(first.updated, 0);

        let second = service.backfill(1, date(2024, 5, 1)).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, first.inserted);
        assert_eq!(
            store.fx_rates().await.unwrap().len(),
            first.inserted
        );
    }
}
