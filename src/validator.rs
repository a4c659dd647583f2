//! Per-category validation of raw adapter rows. The partition into
//! accepted and rejected is total: every input row lands in exactly one
//! bucket, and every rejection carries a reason code.

use crate::category::Category;
use crate::currency::is_placeholder;
use crate::record::{SourceRecord, StagingRow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectReason {
    MissingField(&'static str),
    OutOfRange(&'static str),
    MalformedKey,
}

impl RejectReason {
    /// Stable reason code for report aggregation.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingField(_) => "missing_field",
            RejectReason::OutOfRange(_) => "out_of_range",
            RejectReason::MalformedKey => "malformed_key",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing_field:{field}"),
            RejectReason::OutOfRange(field) => write!(f, "out_of_range:{field}"),
            RejectReason::MalformedKey => write!(f, "malformed_key"),
        }
    }
}

/// A rejected row with enough context to audit it from the run report.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub ticker: Option<String>,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct Validated {
    pub accepted: Vec<StagingRow>,
    pub rejected: Vec<Rejection>,
}

fn norm_text(value: Option<&String>) -> Option<String> {
    let text = value?.trim();
    if text.is_empty() || is_placeholder(text) {
        return None;
    }
    Some(text.to_string())
}

/// Validates and normalizes a batch of raw rows for one category.
/// `now` stamps the `updated_at` provenance field of accepted rows.
pub fn validate(
    category: Category,
    records: Vec<SourceRecord>,
    now: DateTime<Utc>,
) -> Validated {
    let mut out = Validated::default();

    for mut record in records {
        record.ticker = norm_text(record.ticker.as_ref()).map(|t| t.to_uppercase());
        record.name = norm_text(record.name.as_ref());
        record.currency = norm_text(record.currency.as_ref()).map(|c| c.to_uppercase());
        record.holding_name = norm_text(record.holding_name.as_ref());
        record.dimension = norm_text(record.dimension.as_ref()).map(|d| d.to_lowercase());
        record.label = norm_text(record.label.as_ref());
        record.detail = norm_text(record.detail.as_ref());
        record.url = norm_text(record.url.as_ref());

        match check(category, &mut record) {
            Ok(()) => {}
            Err(reason) => {
                debug!(%category, ?reason, ticker = ?record.ticker, "Rejected row");
                out.rejected.push(Rejection {
                    ticker: record.ticker.clone(),
                    reason,
                });
                continue;
            }
        }

        let key = match category.natural_key(&record) {
            Some(key) => key,
            None => {
                out.rejected.push(Rejection {
                    ticker: record.ticker.clone(),
                    reason: RejectReason::MalformedKey,
                });
                continue;
            }
        };

        out.accepted.push(StagingRow {
            key,
            ticker: record.ticker.unwrap_or_default(),
            name: record.name,
            as_of_date: record.as_of_date,
            nav_price: record.nav_price,
            currency: record.currency,
            holding_name: record.holding_name,
            weight_pct: record.weight_pct,
            dimension: record.dimension,
            label: record.label,
            detail: record.detail,
            source: record.source,
            scrape_date: record.scrape_date,
            url: record.url,
            updated_at: now,
        });
    }

    out
}

fn require(value: &Option<String>, field: &'static str) -> Result<(), RejectReason> {
    if value.is_none() {
        return Err(RejectReason::MissingField(field));
    }
    Ok(())
}

fn require_range(
    value: Option<Decimal>,
    field: &'static str,
    min: Decimal,
    max: Option<Decimal>,
) -> Result<(), RejectReason> {
    let v = value.ok_or(RejectReason::MissingField(field))?;
    if v < min || max.is_some_and(|m| v > m) {
        return Err(RejectReason::OutOfRange(field));
    }
    Ok(())
}

fn check(category: Category, record: &mut SourceRecord) -> Result<(), RejectReason> {
    if record.ticker.is_none() {
        // The ticker is a natural-key component everywhere.
        return Err(RejectReason::MalformedKey);
    }
    match category {
        Category::MasterTicker => {
            // Name defaults to the ticker when the source omits it.
            if record.name.is_none() {
                record.name = record.ticker.clone();
            }
        }
        Category::DailyNav => {
            require(&record.currency, "currency")?;
            // A strictly positive price; zero and negative NAVs are junk.
            let price = record.nav_price.ok_or(RejectReason::MissingField("nav_price"))?;
            if price <= dec!(0) {
                return Err(RejectReason::OutOfRange("nav_price"));
            }
            // As-of falls back to the scrape date, as the source loaders did.
            if record.as_of_date.is_none() {
                record.as_of_date = Some(record.scrape_date);
            }
        }
        Category::StaticDetail => {
            require(&record.detail, "detail")?;
        }
        Category::Holdings => {
            require(&record.holding_name, "holding_name")?;
            require_range(record.weight_pct, "weight_pct", dec!(0), Some(dec!(100)))?;
        }
        Category::SectorRegion => {
            require(&record.dimension, "dimension")?;
            require(&record.label, "label")?;
            require_range(record.weight_pct, "weight_pct", dec!(0), Some(dec!(100)))?;
        }
    }
    Ok(())
}
