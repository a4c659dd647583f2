//! Record types flowing through the pipeline: raw adapter output,
//! durable staging rows and FX rates.

use crate::category::Source;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One raw fact fetched by a source adapter. Ephemeral, produced per run
/// and never mutated after validation. Fields are a union across all
/// categories; the validator decides which are required.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub as_of_date: Option<NaiveDate>,
    pub nav_price: Option<Decimal>,
    pub currency: Option<String>,
    pub holding_name: Option<String>,
    pub weight_pct: Option<Decimal>,
    pub dimension: Option<String>,
    pub label: Option<String>,
    pub detail: Option<String>,
    pub url: Option<String>,
    pub source: Source,
    pub scrape_date: NaiveDate,
}

impl SourceRecord {
    pub fn new(source: Source, scrape_date: NaiveDate) -> Self {
        SourceRecord {
            ticker: None,
            name: None,
            as_of_date: None,
            nav_price: None,
            currency: None,
            holding_name: None,
            weight_pct: None,
            dimension: None,
            label: None,
            detail: None,
            url: None,
            source,
            scrape_date,
        }
    }
}

/// The durable, deduplicated form of a record inside one category's
/// staging table. At most one row exists per natural key; a re-ingested
/// record overwrites non-key fields and refreshes `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
    pub key: String,
    pub ticker: String,
    pub name: Option<String>,
    pub as_of_date: Option<NaiveDate>,
    pub nav_price: Option<Decimal>,
    pub currency: Option<String>,
    pub holding_name: Option<String>,
    pub weight_pct: Option<Decimal>,
    pub dimension: Option<String>,
    pub label: Option<String>,
    pub detail: Option<String>,
    pub source: Source,
    pub scrape_date: NaiveDate,
    pub url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StagingRow {
    /// Content equality ignoring the `updated_at` provenance timestamp,
    /// which is refreshed on every upsert even when nothing changed.
    pub fn same_content(&self, other: &StagingRow) -> bool {
        let mut a = self.clone();
        a.updated_at = other.updated_at;
        a == *other
    }
}

/// A daily currency-pair conversion rate, keyed by (date, from, to).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub rate_date: NaiveDate,
    pub from_currency: String,
    pub to_currency: String,
    pub fx_rate: Decimal,
    pub provider: String,
    pub updated_at: DateTime<Utc>,
}

impl FxRate {
    pub fn key(&self) -> String {
        Self::key_for(self.rate_date, &self.from_currency, &self.to_currency)
    }

    pub fn key_for(date: NaiveDate, from: &str, to: &str) -> String {
        format!("{date}|{from}|{to}")
    }

    pub fn same_content(&self, other: &FxRate) -> bool {
        let mut a = self.clone();
        a.updated_at = other.updated_at;
        a == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_same_content_ignores_updated_at() {
        let mut row = StagingRow {
            key: "ABC|2024-05-01".to_string(),
            ticker: "ABC".to_string(),
            name: None,
            as_of_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            nav_price: Some(dec!(10.50)),
            currency: Some("GBP".to_string()),
            holding_name: None,
            weight_pct: None,
            dimension: None,
            label: None,
            detail: None,
            source: Source::FinancialTimes,
            scrape_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            url: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap(),
        };
        let mut later = row.clone();
        later.updated_at = Utc.with_ymd_and_hms(2024, 5, 3, 6, 0, 0).unwrap();
        assert!(row.same_content(&later));

        row.nav_price = Some(dec!(11.00));
        assert!(!row.same_content(&later));
    }

    #[test]
    fn test_fx_key_format() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(FxRate::key_for(date, "GBP", "USD"), "2024-05-01|GBP|USD");
    }
}
