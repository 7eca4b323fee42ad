//! Screening report assembly

use crate::screens::ViolationTable;
use crate::{MonitorError, Usecase};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Suffix of the alert-store key holding the notification sent for a day
pub const SUMMARY_ALERT_SUFFIX: &str = "alerts";

/// Overall outcome of a screening run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    AlertsFound,
    NoAlerts,
}

/// Result of one detection run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningReport {
    pub run_id: Uuid,
    /// Last day covered by the screened window (yesterday)
    pub screened_on: NaiveDate,
    pub status: ReportStatus,
    /// Non-empty violation tables only, in usecase order
    pub detected: BTreeMap<Usecase, ViolationTable>,
    /// Screens that could not complete
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<Usecase, String>,
    pub generated_at: DateTime<Utc>,
}

impl ScreeningReport {
    /// Build a report from per-usecase screen results
    pub fn from_outcomes(
        screened_on: NaiveDate,
        outcomes: impl IntoIterator<Item = (Usecase, Result<ViolationTable, MonitorError>)>,
    ) -> Self {
        let mut detected = BTreeMap::new();
        let mut failures = BTreeMap::new();

        for (usecase, outcome) in outcomes {
            match outcome {
                Ok(table) if table.is_empty() => {}
                Ok(table) => {
                    detected.insert(usecase, table);
                }
                Err(e) => {
                    failures.insert(usecase, e.to_string());
                }
            }
        }

        let status = if detected.is_empty() {
            ReportStatus::NoAlerts
        } else {
            ReportStatus::AlertsFound
        };

        Self {
            run_id: Uuid::new_v4(),
            screened_on,
            status,
            detected,
            failures,
            generated_at: Utc::now(),
        }
    }

    pub fn has_alerts(&self) -> bool {
        self.status == ReportStatus::AlertsFound
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn get(&self, usecase: Usecase) -> Option<&ViolationTable> {
        self.detected.get(&usecase)
    }

    /// Total number of offending rows across usecases
    pub fn violation_count(&self) -> usize {
        self.detected.values().map(ViolationTable::len).sum()
    }

    /// One line naming every failed screen and why
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(usecase, reason)| format!("{}: {}", usecase, reason))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Combine the three screen outcomes into a report
pub fn build_report(screened_on: NaiveDate, outcomes: [ViolationTable; 3]) -> ScreeningReport {
    ScreeningReport::from_outcomes(
        screened_on,
        outcomes.into_iter().map(|table| (table.usecase(), Ok(table))),
    )
}

/// Alert-store key for a usecase (or the day's summary) on `date`
pub fn alert_key(date: NaiveDate, name: &str) -> String {
    format!("{}_{}", date.format("%Y-%m-%d"), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::PairKey;
    use crate::screens::{ExchangeViolation, SingleViolation};

    fn screened_on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn empty_outcomes() -> [ViolationTable; 3] {
        [
            ViolationTable::Single(Vec::new()),
            ViolationTable::SumReceived(Vec::new()),
            ViolationTable::Exchange(Vec::new()),
        ]
    }

    #[test]
    fn test_no_alerts() {
        let report = build_report(screened_on(), empty_outcomes());

        assert_eq!(report.status, ReportStatus::NoAlerts);
        assert!(report.detected.is_empty());
        assert!(!report.has_alerts());
        assert_eq!(report.violation_count(), 0);
    }

    #[test]
    fn test_single_entry_keyed_by_usecase() {
        let [single, sum_received, _] = empty_outcomes();
        let exchange = ViolationTable::Exchange(vec![ExchangeViolation {
            pair: PairKey::new("B", "A"),
            total: 110.0,
        }]);

        let report = build_report(screened_on(), [single, sum_received, exchange]);

        assert_eq!(report.status, ReportStatus::AlertsFound);
        assert_eq!(report.detected.len(), 1);
        assert!(report.get(Usecase::Exchange).is_some());
        assert!(report.get(Usecase::Single).is_none());
    }

    #[test]
    fn test_detected_order_is_fixed() {
        let single = ViolationTable::Single(vec![SingleViolation {
            source: "A".to_string(),
            destination: "B".to_string(),
            amount: 150.0,
        }]);
        let exchange = ViolationTable::Exchange(vec![ExchangeViolation {
            pair: PairKey::new("A", "B"),
            total: 150.0,
        }]);

        // Outcomes handed over out of order still come back in usecase order
        let report = ScreeningReport::from_outcomes(
            screened_on(),
            vec![
                (Usecase::Exchange, Ok(exchange)),
                (Usecase::Single, Ok(single)),
            ],
        );

        let order: Vec<Usecase> = report.detected.keys().copied().collect();
        assert_eq!(order, vec![Usecase::Single, Usecase::Exchange]);
        assert_eq!(report.violation_count(), 2);
    }

    #[test]
    fn test_failures_are_reported_per_usecase() {
        let report = ScreeningReport::from_outcomes(
            screened_on(),
            vec![
                (Usecase::Single, Ok(ViolationTable::Single(Vec::new()))),
                (
                    Usecase::SumReceived,
                    Err(MonitorError::MalformedDataset {
                        usecase: Usecase::SumReceived,
                        reason: "row 3: empty destination".to_string(),
                    }),
                ),
                (Usecase::Exchange, Ok(ViolationTable::Exchange(Vec::new()))),
            ],
        );

        assert_eq!(report.status, ReportStatus::NoAlerts);
        assert!(report.has_failures());
        assert!(report.failure_summary().starts_with("sum_received: Malformed dataset"));
    }

    #[test]
    fn test_alert_key() {
        assert_eq!(alert_key(screened_on(), Usecase::Exchange.as_str()), "2024-03-09_exchange");
        assert_eq!(alert_key(screened_on(), SUMMARY_ALERT_SUFFIX), "2024-03-09_alerts");
    }

    #[test]
    fn test_json_export() {
        let report = build_report(screened_on(), empty_outcomes());
        let json = report.to_json().unwrap();

        assert!(json.contains("\"status\": \"no_alerts\""));
        assert!(!json.contains("failures"));

        let parsed: ScreeningReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
