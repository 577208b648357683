//! Daily stat aggregation.
//!
//! Each terminal run contributes its counters to the row for the calendar
//! date the run started on. Keys that diverged count as conflicts, the
//! rest as successes, so `sync_success + sync_conflicts` always equals the
//! keys processed that day.

use std::sync::Arc;

use chrono::NaiveDate;

use quadsync_core::{DailyStat, Result};
use quadsync_store::Store;

/// Folds run outcomes into the per-date counters.
pub struct StatsAggregator {
    store: Arc<dyn Store>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply one terminal run's counters to its date. Called exactly once
    /// per run, when it reaches a terminal status.
    pub async fn record_run_outcome(
        &self,
        date: NaiveDate,
        records_processed: u64,
        conflicts_found: u64,
    ) -> Result<()> {
        let success = records_processed.saturating_sub(conflicts_found);
        self.store
            .apply_run_outcome(date, success, conflicts_found)
            .await?;
        Ok(())
    }

    /// The stat row for a date, zero-filled when the date has no row yet.
    pub async fn stat_for(&self, date: NaiveDate) -> Result<DailyStat> {
        Ok(self
            .store
            .get_daily_stat(date)
            .await?
            .unwrap_or_else(|| DailyStat::empty(date)))
    }
}

/// Sync success rate for one date as a percentage, rounded to one decimal.
///
/// A day with no sync activity reports 100.0, not a division error.
pub fn success_rate(stat: &DailyStat) -> f64 {
    let total = stat.sync_success + stat.sync_conflicts;
    if total == 0 {
        return 100.0;
    }
    let rate = stat.sync_success as f64 * 100.0 / total as f64;
    (rate * 10.0).round() / 10.0
}
