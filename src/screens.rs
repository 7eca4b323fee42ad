//! Limit violation screens
//!
//! Each screen takes the rows of its own time window and a limit and returns
//! the offending rows or aggregates. Comparisons are strict: a transfer or
//! total exactly at the limit is not a violation.

use crate::pairs::PairKey;
use crate::rules::RuleSet;
use crate::window::recent;
use crate::{MonitorError, Transaction, Usecase};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Individual transfer above the single-transfer limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleViolation {
    pub source: String,
    pub destination: String,
    pub amount: f64,
}

/// Destination whose received total is above the limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceivedViolation {
    pub destination: String,
    pub total: f64,
}

/// Pair of parties whose exchanged total is above the limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeViolation {
    pub pair: PairKey,
    pub total: f64,
}

/// Outcome of one screen; an empty table means no violation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "usecase", content = "rows", rename_all = "snake_case")]
pub enum ViolationTable {
    Single(Vec<SingleViolation>),
    SumReceived(Vec<ReceivedViolation>),
    Exchange(Vec<ExchangeViolation>),
}

impl ViolationTable {
    pub fn usecase(&self) -> Usecase {
        match self {
            ViolationTable::Single(_) => Usecase::Single,
            ViolationTable::SumReceived(_) => Usecase::SumReceived,
            ViolationTable::Exchange(_) => Usecase::Exchange,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ViolationTable::Single(rows) => rows.len(),
            ViolationTable::SumReceived(rows) => rows.len(),
            ViolationTable::Exchange(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload written to the alert store
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Transfers whose amount exceeds `limit`, in window order
pub fn check_single(data: &[Transaction], limit: f64) -> Vec<SingleViolation> {
    data.iter()
        .filter(|txn| txn.amount > limit)
        .map(|txn| SingleViolation {
            source: txn.source.clone(),
            destination: txn.destination.clone(),
            amount: txn.amount,
        })
        .collect()
}

/// Destinations whose received total exceeds `limit`
pub fn check_sum_received(data: &[Transaction], limit: f64) -> Vec<ReceivedViolation> {
    group_and_check(
        data.iter().map(|txn| (txn.destination.as_str(), txn.amount)),
        limit,
    )
    .into_iter()
    .map(|(destination, total)| ReceivedViolation {
        destination: destination.to_string(),
        total,
    })
    .collect()
}

/// Counterparty pairs whose exchanged total, in both directions, exceeds `limit`
pub fn check_exchanged(data: &[Transaction], limit: f64) -> Vec<ExchangeViolation> {
    group_and_check(
        data.iter()
            .map(|txn| (PairKey::new(&txn.source, &txn.destination), txn.amount)),
        limit,
    )
    .into_iter()
    .map(|(pair, total)| ExchangeViolation { pair, total })
    .collect()
}

/// Sum amounts per key and keep the groups above `limit`, ordered by key
fn group_and_check<K: Ord>(rows: impl IntoIterator<Item = (K, f64)>, limit: f64) -> Vec<(K, f64)> {
    let mut totals: BTreeMap<K, f64> = BTreeMap::new();
    for (key, amount) in rows {
        *totals.entry(key).or_insert(0.0) += amount;
    }
    totals.into_iter().filter(|(_, total)| *total > limit).collect()
}

/// Reject rows a screen cannot aggregate
pub fn validate_dataset(usecase: Usecase, data: &[Transaction]) -> Result<(), MonitorError> {
    let malformed = |row: usize, reason: &str| MonitorError::MalformedDataset {
        usecase,
        reason: format!("row {}: {}", row, reason),
    };

    for (row, txn) in data.iter().enumerate() {
        if !txn.amount.is_finite() || txn.amount <= 0.0 {
            return Err(malformed(row, &format!("amount {} is not positive", txn.amount)));
        }
        if usecase != Usecase::SumReceived && txn.source.trim().is_empty() {
            return Err(malformed(row, "empty source"));
        }
        if txn.destination.trim().is_empty() {
            return Err(malformed(row, "empty destination"));
        }
    }

    Ok(())
}

/// Run the screen of `usecase` over already windowed rows
pub fn screen(usecase: Usecase, data: &[Transaction], limit: f64) -> Result<ViolationTable, MonitorError> {
    validate_dataset(usecase, data)?;

    let table = match usecase {
        Usecase::Single => ViolationTable::Single(check_single(data, limit)),
        Usecase::SumReceived => ViolationTable::SumReceived(check_sum_received(data, limit)),
        Usecase::Exchange => ViolationTable::Exchange(check_exchanged(data, limit)),
    };

    debug!(
        usecase = %usecase,
        rows = data.len(),
        limit,
        violations = table.len(),
        "Screen finished"
    );
    Ok(table)
}

/// Window the dataset to the usecase's time range and run its screen
pub fn detect_limit_violations(
    window: &[Transaction],
    rules: &RuleSet,
    usecase: Usecase,
    today: NaiveDate,
) -> Result<ViolationTable, MonitorError> {
    let rule = rules.get(usecase);
    let data = recent(window, rule.time_range_days, today);
    screen(usecase, &data, rule.limit)
}
