//! In-memory store implementation used by unit tests and dry runs.
//! Tables are BTreeMaps so scan order matches the disk store's key order.

use crate::record::{FxRate, StagingRow};
use crate::store::{FX_TABLE, StagingStore, UpsertOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, table: &str, key: String, value: Vec<u8>) -> (UpsertOutcome, Option<Vec<u8>>) {
        let mut tables = self.tables.write().unwrap();
        let entries = tables.entry(table.to_string()).or_default();
        match entries.insert(key, value) {
            Some(previous) => (UpsertOutcome::Updated, Some(previous)),
            None => (UpsertOutcome::Inserted, None),
        }
    }

    fn values(&self, table: &str) -> Vec<Vec<u8>> {
        let tables = self.tables.read().unwrap();
        tables
            .get(table)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StagingStore for MemoryStore {
    async fn upsert(&self, table: &str, row: StagingRow) -> Result<UpsertOutcome> {
        let value = serde_json::to_vec(&row)?;
        {
            let tables = self.tables.read().unwrap();
            if let Some(bytes) = tables.get(table).and_then(|entries| entries.get(&row.key)) {
                let _: StagingRow = serde_json::from_slice(bytes).with_context(|| {
                    format!("Conflicting undecodable row at {table}/{}", row.key)
                })?;
            }
        }
        let (outcome, _) = self.put(table, row.key.clone(), value);
        Ok(outcome)
    }

    async fn scan(&self, table: &str) -> Result<Vec<StagingRow>> {
        self.values(table)
            .iter()
            .map(|value| {
                serde_json::from_slice(value)
                    .with_context(|| format!("Undecodable row while scanning {table}"))
            })
            .collect()
    }

    async fn upsert_fx(&self, rate: FxRate) -> Result<UpsertOutcome> {
        let value = serde_json::to_vec(&rate)?;
        let (outcome, _) = self.put(FX_TABLE, rate.key(), value);
        Ok(outcome)
    }

    async fn get_fx(&self, date: NaiveDate, from: &str, to: &str) -> Result<Option<FxRate>> {
        let tables = self.tables.read().unwrap();
        let key = FxRate::key_for(date, from, to);
        tables
            .get(FX_TABLE)
            .and_then(|entries| entries.get(&key))
            .map(|value| serde_json::from_slice(value).map_err(Into::into))
            .transpose()
    }

    async fn fx_rates(&self) -> Result<Vec<FxRate>> {
        self.values(FX_TABLE)
            .iter()
            .map(|value| serde_json::from_slice(value).map_err(Into::into))
            .collect()
    }

    async fn replace_view(&self, table: &str, rows: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        tables.insert(table.to_string(), rows.into_iter().collect());
        Ok(())
    }

    async fn read_view(&self, table: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.values(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Source;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn row(key: &str) -> StagingRow {
        StagingRow {
            key: key.to_string(),
            ticker: "ABC".to_string(),
            name: None,
            as_of_date: None,
            nav_price: Some(dec!(1)),
            currency: Some("USD".to_string()),
            holding_name: None,
            weight_pct: None,
            dimension: None,
            label: None,
            detail: None,
            source: Source::YahooFinance,
            scrape_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            url: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_natural_key_uniqueness() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.upsert("t", row("ABC")).await.unwrap();
        }
        store.upsert("t", row("DEF")).await.unwrap();
        assert_eq!(store.scan("t").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_is_key_ordered() {
        let store = MemoryStore::new();
        store.upsert("t", row("ZZZ")).await.unwrap();
        store.upsert("t", row("AAA")).await.unwrap();
        let keys: Vec<String> = store
            .scan("t")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["AAA".to_string(), "ZZZ".to_string()]);
    }

    #[tokio::test]
    async fn test_undecodable_existing_row_is_row_fatal() {
        let store = MemoryStore::new();
        store.put("t", "ABC".to_string(), b"not json".to_vec());
        let err = store.upsert("t", row("ABC")).await.unwrap_err();
        assert!(err.to_string().contains("Conflicting undecodable row"));
    }
}
