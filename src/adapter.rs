//! Source adapter seam. Adapters are opaque to the pipeline: they fetch
//! raw records for one point in time or fail, and errors are always
//! distinguishable from empty results.

use crate::category::{Category, Source};
use crate::record::SourceRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Per-invocation context passed to every fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext {
    /// The run's civil date; becomes `scrape_date` provenance on records.
    pub scrape_date: NaiveDate,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch(&self, category: Category, ctx: &FetchContext) -> Result<Vec<SourceRecord>>;
}
