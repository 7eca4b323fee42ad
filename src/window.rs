//! Rolling transaction window
//!
//! Days are counted back from `today`, and today itself is never part of a
//! window: `days_ago = 0` means yesterday. All functions here are pure; the
//! persisted window is only replaced by the monitor, once per run.

use crate::{Transaction, Transfer};
use chrono::{Duration, NaiveDate};
use tracing::debug;

/// Date `days_ago` days before yesterday, clamped to the earliest date
pub fn past_date(today: NaiveDate, days_ago: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(days_ago) + 1))
        .unwrap_or(NaiveDate::MIN)
}

pub fn yesterday(today: NaiveDate) -> NaiveDate {
    past_date(today, 0)
}

/// Transactions from the last `days` days, ending with yesterday
pub fn recent(dataset: &[Transaction], days: u32, today: NaiveDate) -> Vec<Transaction> {
    let cutoff = past_date(today, days);
    dataset
        .iter()
        .filter(|txn| txn.date > cutoff)
        .cloned()
        .collect()
}

/// Date the batch with `days_ago`, then append it to `old`
pub fn refresh(
    mut old: Vec<Transaction>,
    batch: Vec<Transfer>,
    days_ago: u32,
    today: NaiveDate,
) -> Vec<Transaction> {
    let date = past_date(today, days_ago);
    debug!(%date, rows = batch.len(), "Appending daily batch to window");
    old.extend(batch.into_iter().map(|transfer| transfer.dated(date)));
    old
}

/// Trim `old` to the retention length, then append yesterday's batch
pub fn roll(
    old: &[Transaction],
    batch: Vec<Transfer>,
    retention_days: u32,
    today: NaiveDate,
) -> Vec<Transaction> {
    let kept = recent(old, retention_days, today);
    debug!(
        before = old.len(),
        kept = kept.len(),
        retention_days,
        "Trimmed window to retention"
    );
    refresh(kept, batch, 0, today)
}

pub fn has_date(dataset: &[Transaction], date: NaiveDate) -> bool {
    dataset.iter().any(|txn| txn.date == date)
}

/// Key of a day's batch in the transaction source (`DD.MM.YYYY`)
pub fn sheet_name(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}
