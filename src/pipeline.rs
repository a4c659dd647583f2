//! Pipeline orchestration: decides which categories run today, executes
//! them through the adapters in a fixed order and aggregates a run
//! report. Failures stay at the level they occur: a bad row never fails
//! its category, a failed (category, source) never aborts its siblings.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use comfy_table::Cell;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapter::{FetchContext, SourceAdapter};
use crate::calendar;
use crate::category::Category;
use crate::store::{StagingStore, UpsertOutcome};
use crate::ui;
use crate::validator;

/// Per-category run configuration.
#[derive(Debug, Clone, Copy)]
pub struct CategoryToggle {
    pub enabled: bool,
    /// Bypasses the market-closed gate for weekly categories.
    pub force: bool,
}

impl Default for CategoryToggle {
    fn default() -> Self {
        CategoryToggle {
            enabled: true,
            force: false,
        }
    }
}

/// One invocation's configuration. `today` is injected rather than read
/// from the clock so decisions are unit-testable.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub master_ticker: CategoryToggle,
    pub daily_nav: CategoryToggle,
    pub static_detail: CategoryToggle,
    pub holdings: CategoryToggle,
    pub sector_region: CategoryToggle,
    pub today: NaiveDate,
}

impl RunOptions {
    pub fn all_enabled(today: NaiveDate) -> Self {
        RunOptions {
            master_ticker: CategoryToggle::default(),
            daily_nav: CategoryToggle::default(),
            static_detail: CategoryToggle::default(),
            holdings: CategoryToggle::default(),
            sector_region: CategoryToggle::default(),
            today,
        }
    }

    pub fn toggle(&self, category: Category) -> CategoryToggle {
        match category {
            Category::MasterTicker => self.master_ticker,
            Category::DailyNav => self.daily_nav,
            Category::StaticDetail => self.static_detail,
            Category::Holdings => self.holdings,
            Category::SectorRegion => self.sector_region,
        }
    }
}

/// Whether a category runs this invocation, and why not if it doesn't.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDecision {
    pub category: Category,
    pub run: bool,
    pub skip_reason: Option<String>,
}

/// Computes the per-category decisions for one invocation, in pipeline
/// order. Gated categories need `enabled && (force || market closed)`.
pub fn decide(options: &RunOptions) -> Vec<RunDecision> {
    Category::PIPELINE_ORDER
        .iter()
        .map(|&category| {
            let toggle = options.toggle(category);
            if !toggle.enabled {
                return RunDecision {
                    category,
                    run: false,
                    skip_reason: Some("disabled".to_string()),
                };
            }
            if category.market_closed_gated()
                && !toggle.force
                && !calendar::is_market_closed(options.today)
            {
                return RunDecision {
                    category,
                    run: false,
                    skip_reason: Some("market open".to_string()),
                };
            }
            RunDecision {
                category,
                run: true,
                skip_reason: None,
            }
        })
        .collect()
}

/// Outcome of one (category, source) execution, or a skip marker when
/// the category did not run.
#[derive(Debug, Clone)]
pub struct CategoryRunEntry {
    pub category: Category,
    pub source: Option<String>,
    pub attempted: bool,
    pub rows_fetched: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub reject_reasons: BTreeMap<&'static str, usize>,
    pub inserted: usize,
    pub updated: usize,
    pub row_errors: usize,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
}

impl CategoryRunEntry {
    fn skipped(category: Category, reason: String) -> Self {
        CategoryRunEntry {
            category,
            source: None,
            attempted: false,
            rows_fetched: 0,
            rows_accepted: 0,
            rows_rejected: 0,
            reject_reasons: BTreeMap::new(),
            inserted: 0,
            updated: 0,
            row_errors: 0,
            error: None,
            skip_reason: Some(reason),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub entries: Vec<CategoryRunEntry>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.error.is_some())
    }

    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell("Source"),
            ui::header_cell("Fetched"),
            ui::header_cell("Accepted"),
            ui::header_cell("Rejected"),
            ui::header_cell("Inserted"),
            ui::header_cell("Updated"),
            ui::header_cell("Status"),
        ]);

        for entry in &self.entries {
            let status = if let Some(reason) = &entry.skip_reason {
                ui::style_text(&format!("skipped ({reason})"), ui::StyleType::Subtle)
            } else if let Some(error) = &entry.error {
                ui::style_text(&format!("failed: {error}"), ui::StyleType::Error)
            } else if entry.rows_rejected > 0 || entry.row_errors > 0 {
                let reasons = entry
                    .reject_reasons
                    .iter()
                    .map(|(code, count)| format!("{code}={count}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("ok ({reasons})")
            } else {
                ui::style_text("ok", ui::StyleType::Ok)
            };

            table.add_row(vec![
                Cell::new(entry.category.slug()),
                Cell::new(entry.source.as_deref().unwrap_or("-")),
                ui::count_cell(entry.rows_fetched),
                ui::count_cell(entry.rows_accepted),
                ui::count_cell(entry.rows_rejected),
                ui::count_cell(entry.inserted),
                ui::count_cell(entry.updated),
                Cell::new(status),
            ]);
        }

        let mut output = format!(
            "Run report ({})\n\n",
            ui::style_text(&self.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(), ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!("\n\nCompleted in {:.2?}", self.duration));
        output
    }
}

pub struct Pipeline<'a> {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    store: &'a dyn StagingStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, store: &'a dyn StagingStore) -> Self {
        Pipeline { adapters, store }
    }

    /// Executes one invocation. Categories run in pipeline order; within
    /// a category the per-source fetches fan out concurrently since each
    /// (category, source) pair writes only its own staging table.
    pub async fn run(&self, options: &RunOptions, show_progress: bool) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let decisions = decide(options);
        let ctx = FetchContext {
            scrape_date: options.today,
        };

        let to_run = decisions.iter().filter(|d| d.run).count();
        let pb = if show_progress {
            Some(ui::new_progress_bar(
                (to_run * self.adapters.len()) as u64,
                true,
            ))
        } else {
            None
        };

        let mut entries = Vec::new();
        for decision in decisions {
            if !decision.run {
                let reason = decision.skip_reason.unwrap_or_default();
                info!(category = %decision.category, reason, "Skipping category");
                entries.push(CategoryRunEntry::skipped(decision.category, reason));
                continue;
            }

            if let Some(pb) = &pb {
                pb.set_message(format!("Running {}...", decision.category));
            }
            let runs = self.adapters.iter().map(|adapter| {
                let pb = pb.clone();
                async move {
                    let entry = self
                        .run_category_source(decision.category, adapter.as_ref(), &ctx)
                        .await;
                    if let Some(pb) = pb {
                        pb.inc(1);
                    }
                    entry
                }
            });
            entries.extend(join_all(runs).await);
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let report = RunReport {
            started_at,
            duration: clock.elapsed(),
            entries,
        };
        info!(
            entries = report.entries.len(),
            failures = report.has_failures(),
            "Pipeline run finished in {:.2?}",
            report.duration
        );
        report
    }

    async fn run_category_source(
        &self,
        category: Category,
        adapter: &dyn SourceAdapter,
        ctx: &FetchContext,
    ) -> CategoryRunEntry {
        let source = adapter.source();
        let mut entry = CategoryRunEntry {
            category,
            source: Some(source.label().to_string()),
            attempted: true,
            rows_fetched: 0,
            rows_accepted: 0,
            rows_rejected: 0,
            reject_reasons: BTreeMap::new(),
            inserted: 0,
            updated: 0,
            row_errors: 0,
            error: None,
            skip_reason: None,
        };

        let records = match adapter.fetch(category, ctx).await {
            Ok(records) => records,
            Err(e) => {
                // Adapter failures are category-level: recorded, skipped,
                // retried only by the next scheduled invocation.
                warn!(%category, %source, error = %e, "Adapter fetch failed");
                entry.error = Some(e.to_string());
                return entry;
            }
        };
        entry.rows_fetched = records.len();

        let validated = validator::validate(category, records, Utc::now());
        entry.rows_accepted = validated.accepted.len();
        entry.rows_rejected = validated.rejected.len();
        for rejection in &validated.rejected {
            *entry.reject_reasons.entry(rejection.reason.code()).or_insert(0) += 1;
        }

        let table = category.staging_table(source);
        for row in validated.accepted {
            let key = row.key.clone();
            match self.store.upsert(&table, row).await {
                Ok(UpsertOutcome::Inserted) => entry.inserted += 1,
                Ok(UpsertOutcome::Updated) => entry.updated += 1,
                Err(e) => {
                    warn!(%category, %source, key, error = %e, "Row upsert failed");
                    entry.row_errors += 1;
                }
            }
        }

        debug!(
            %category,
            %source,
            fetched = entry.rows_fetched,
            accepted = entry.rows_accepted,
            rejected = entry.rows_rejected,
            "Category execution done"
        );
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Source;
    use crate::record::SourceRecord;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
    }

    fn saturday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
    }

    #[test]
    fn test_gated_category_skipped_on_open_market() {
        let options = RunOptions::all_enabled(monday());
        let decisions = decide(&options);
        let holdings = decisions
            .iter()
            .find(|d| d.category == Category::Holdings)
            .unwrap();
        assert!(!holdings.run);
        assert_eq!(holdings.skip_reason.as_deref(), Some("market open"));

        let nav = decisions
            .iter()
            .find(|d| d.category == Category::DailyNav)
            .unwrap();
        assert!(nav.run);
    }

    #[test]
    fn test_force_bypasses_gate() {
        let mut options = RunOptions::all_enabled(monday());
        options.holdings.force = true;
        let decisions = decide(&options);
        let holdings = decisions
            .iter()
            .find(|d| d.category == Category::Holdings)
            .unwrap();
        assert!(holdings.run);
    }

    #[test]
    fn test_gated_category_runs_on_weekend() {
        let options = RunOptions::all_enabled(saturday());
        assert!(decide(&options).iter().all(|d| d.run));
    }

    #[test]
    fn test_disabled_category_never_runs() {
        let mut options = RunOptions::all_enabled(saturday());
        options.sector_region.enabled = false;
        let decisions = decide(&options);
        let sector = decisions
            .iter()
            .find(|d| d.category == Category::SectorRegion)
            .unwrap();
        assert!(!sector.run);
        assert_eq!(sector.skip_reason.as_deref(), Some("disabled"));
    }

    #[test]
    fn test_decisions_follow_pipeline_order() {
        let options = RunOptions::all_enabled(saturday());
        let order: Vec<Category> = decide(&options).iter().map(|d| d.category).collect();
        assert_eq!(order, Category::PIPELINE_ORDER.to_vec());
    }

    struct StubAdapter {
        source: Source,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch(
            &self,
            category: Category,
            ctx: &FetchContext,
        ) -> Result<Vec<SourceRecord>> {
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            let mut good = SourceRecord::new(self.source, ctx.scrape_date);
            good.ticker = Some("ABC".to_string());
            good.name = Some("Alpha Fund".to_string());
            good.nav_price = Some(dec!(10.50));
            good.currency = Some("GBP".to_string());
            good.as_of_date = NaiveDate::from_ymd_opt(2024, 1, 5);
            good.holding_name = Some("Apple Inc".to_string());
            good.weight_pct = Some(dec!(5.5));
            good.dimension = Some("sector".to_string());
            good.label = Some("Technology".to_string());
            good.detail = Some("Equity fund".to_string());

            let mut bad = SourceRecord::new(self.source, ctx.scrape_date);
            bad.ticker = Some("DEF".to_string());
            bad.nav_price = Some(dec!(-1));
            bad.currency = Some("GBP".to_string());
            bad.holding_name = Some("Junk".to_string());
            bad.weight_pct = Some(dec!(200));
            bad.dimension = Some("sector".to_string());

            let _ = category;
            Ok(vec![good, bad])
        }
    }

    #[tokio::test]
    async fn test_adapter_failure_does_not_abort_siblings() {
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(
            vec![
                Arc::new(StubAdapter {
                    source: Source::FinancialTimes,
                    fail: true,
                }),
                Arc::new(StubAdapter {
                    source: Source::YahooFinance,
                    fail: false,
                }),
            ],
            &store,
        );

        let mut options = RunOptions::all_enabled(monday());
        options.static_detail.enabled = false;
        options.holdings.enabled = false;
        options.sector_region.enabled = false;
        let report = pipeline.run(&options, false).await;

        assert!(report.has_failures());
        let nav_entries: Vec<&CategoryRunEntry> = report
            .entries
            .iter()
            .filter(|e| e.category == Category::DailyNav)
            .collect();
        assert_eq!(nav_entries.len(), 2);

        let failed = nav_entries
            .iter()
            .find(|e| e.source.as_deref() == Some("Financial Times"))
            .unwrap();
        assert!(failed.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(failed.rows_fetched, 0);

        let succeeded = nav_entries
            .iter()
            .find(|e| e.source.as_deref() == Some("Yahoo Finance"))
            .unwrap();
        assert!(succeeded.error.is_none());
        assert_eq!(succeeded.rows_fetched, 2);
        assert_eq!(succeeded.rows_accepted, 1);
        assert_eq!(succeeded.rows_rejected, 1);
        assert_eq!(succeeded.reject_reasons.get("out_of_range"), Some(&1));

        // Healthy source's rows landed in its own staging table
        let rows = store.scan("stg_yf_daily_nav").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "ABC");
    }

    #[tokio::test]
    async fn test_rerun_reports_updates_not_inserts() {
        let store = MemoryStore::new();
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StubAdapter {
            source: Source::StockAnalysis,
            fail: false,
        })];
        let pipeline = Pipeline::new(adapters, &store);
        let options = RunOptions::all_enabled(saturday());

        let first = pipeline.run(&options, false).await;
        let inserted: usize = first.entries.iter().map(|e| e.inserted).sum();
        assert!(inserted > 0);

        let second = pipeline.run(&options, false).await;
        assert_eq!(second.entries.iter().map(|e| e.inserted).sum::<usize>(), 0);
        assert_eq!(
            second.entries.iter().map(|e| e.updated).sum::<usize>(),
            inserted
        );
    }

    #[tokio::test]
    async fn test_skipped_entries_appear_in_report() {
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(vec![], &store);
        let mut options = RunOptions::all_enabled(monday());
        options.master_ticker.enabled = false;
        options.daily_nav.enabled = false;
        options.static_detail.enabled = false;

        let report = pipeline.run(&options, false).await;
        assert_eq!(report.entries.len(), 5);
        assert!(report.entries.iter().all(|e| !e.attempted));
        assert!(!report.has_failures());
    }
}
