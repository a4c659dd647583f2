//! Persistent store interface for staging tables, FX rates and derived
//! mart views. The only write primitive is an atomic upsert-by-key; there
//! is deliberately no exists-then-insert split, so concurrent runs of the
//! same category cannot race between the check and the write.

pub mod disk;
pub mod memory;

use crate::record::{FxRate, StagingRow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub use disk::FjallStore;
pub use memory::MemoryStore;

/// Table holding daily currency-pair rates keyed by (date, from, to).
pub const FX_TABLE: &str = "daily_fx_rates";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Category-qualified staging store. One table per (category, source)
/// pair, plus the FX table and the derived mart views.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Inserts or overwrites the row at its natural key. Last-write-wins
    /// on non-key fields; `updated_at` is taken from the row as given.
    async fn upsert(&self, table: &str, row: StagingRow) -> Result<UpsertOutcome>;

    /// All rows of a staging table, in key order.
    async fn scan(&self, table: &str) -> Result<Vec<StagingRow>>;

    async fn upsert_fx(&self, rate: FxRate) -> Result<UpsertOutcome>;

    async fn get_fx(&self, date: NaiveDate, from: &str, to: &str) -> Result<Option<FxRate>>;

    async fn fx_rates(&self) -> Result<Vec<FxRate>>;

    /// Replaces the full contents of a derived view with pre-serialized
    /// rows. Views are recomputed, never incrementally maintained.
    async fn replace_view(&self, table: &str, rows: Vec<(String, Vec<u8>)>) -> Result<()>;

    /// Raw view contents in key order, for consumers and reproducibility
    /// checks.
    async fn read_view(&self, table: &str) -> Result<Vec<Vec<u8>>>;
}
