//! Durable store backed by a fjall keyspace, one partition per table.
//! Rows are stored as JSON under their natural key, so key order is the
//! scan order and every write is a single atomic partition insert.

use crate::record::{FxRate, StagingRow};
use crate::store::{FX_TABLE, StagingStore, UpsertOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

pub struct FjallStore {
    keyspace: Keyspace,
    partitions: RwLock<HashMap<String, PartitionHandle>>,
}

impl FjallStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Ok(FjallStore {
            keyspace,
            partitions: RwLock::new(HashMap::new()),
        })
    }

    fn partition(&self, name: &str) -> Result<PartitionHandle> {
        if let Some(partition) = self.partitions.read().unwrap().get(name) {
            return Ok(partition.clone());
        }
        let mut partitions = self.partitions.write().unwrap();
        if let Some(partition) = partitions.get(name) {
            return Ok(partition.clone());
        }
        let partition = self
            .keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .with_context(|| format!("Failed to open partition: {name}"))?;
        partitions.insert(name.to_string(), partition.clone());
        Ok(partition)
    }

}

#[async_trait]
impl StagingStore for FjallStore {
    async fn upsert(&self, table: &str, row: StagingRow) -> Result<UpsertOutcome> {
        let partition = self.partition(table)?;
        let outcome = match partition.get(row.key.as_bytes())? {
            Some(bytes) => {
                // An undecodable value at an existing key is a conflict
                // anomaly: fatal for this row before anything is written,
                // invisible to its siblings.
                let previous: StagingRow = serde_json::from_slice(&bytes).with_context(|| {
                    format!("Conflicting undecodable row at {table}/{}", row.key)
                })?;
                if previous.same_content(&row) {
                    debug!(table, key = %row.key, "Upsert left content unchanged");
                }
                UpsertOutcome::Updated
            }
            None => UpsertOutcome::Inserted,
        };
        partition.insert(row.key.as_bytes(), serde_json::to_vec(&row)?)?;
        Ok(outcome)
    }

    async fn scan(&self, table: &str) -> Result<Vec<StagingRow>> {
        let partition = self.partition(table)?;
        let mut rows = Vec::new();
        for item in partition.iter() {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value).with_context(|| {
                format!("Undecodable row while scanning {table}")
            })?);
        }
        Ok(rows)
    }

    async fn upsert_fx(&self, rate: FxRate) -> Result<UpsertOutcome> {
        let partition = self.partition(FX_TABLE)?;
        let key = rate.key();
        let outcome = if partition.get(key.as_bytes())?.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        partition.insert(key.as_bytes(), serde_json::to_vec(&rate)?)?;
        Ok(outcome)
    }

    async fn get_fx(&self, date: NaiveDate, from: &str, to: &str) -> Result<Option<FxRate>> {
        let partition = self.partition(FX_TABLE)?;
        let key = FxRate::key_for(date, from, to);
        match partition.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value).with_context(|| {
                format!("Undecodable FX rate at {key}")
            })?)),
            None => Ok(None),
        }
    }

    async fn fx_rates(&self) -> Result<Vec<FxRate>> {
        let partition = self.partition(FX_TABLE)?;
        let mut rates = Vec::new();
        for item in partition.iter() {
            let (_key, value) = item?;
            rates.push(serde_json::from_slice(&value)?);
        }
        Ok(rates)
    }

    async fn replace_view(&self, table: &str, rows: Vec<(String, Vec<u8>)>) -> Result<()> {
        let partition = self.partition(table)?;
        let mut stale = Vec::new();
        for item in partition.iter() {
            let (key, _value) = item?;
            stale.push(key);
        }
        for key in stale {
            partition.remove(key)?;
        }
        let count = rows.len();
        for (key, value) in rows {
            partition.insert(key.as_bytes(), value)?;
        }
        debug!(table, rows = count, "Replaced view contents");
        Ok(())
    }

    async fn read_view(&self, table: &str) -> Result<Vec<Vec<u8>>> {
        let partition = self.partition(table)?;
        let mut rows = Vec::new();
        for item in partition.iter() {
            let (_key, value) = item?;
            rows.push(value.to_vec());
        }
        Ok(rows)
    }
}
