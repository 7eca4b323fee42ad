//! Screening engine: fan the three screens out over one window snapshot

use crate::report::ScreeningReport;
use crate::rules::RuleSet;
use crate::screens::{detect_limit_violations, ViolationTable};
use crate::window::yesterday;
use crate::{MonitorError, Transaction, Usecase};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Runs the violation screens for one rule set
#[derive(Debug, Clone)]
pub struct ScreeningEngine {
    rules: RuleSet,
    retention_days: u32,
}

impl ScreeningEngine {
    /// Create an engine, refusing rules that look further back than the window
    pub fn new(rules: RuleSet, retention_days: u32) -> Result<Self, MonitorError> {
        rules.ensure_covered_by(retention_days)?;
        Ok(Self {
            rules,
            retention_days,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Run the screens one after another on the calling thread
    pub fn screen(&self, window: &[Transaction], today: NaiveDate) -> ScreeningReport {
        ScreeningReport::from_outcomes(
            yesterday(today),
            Usecase::ALL.map(|usecase| {
                (
                    usecase,
                    detect_limit_violations(window, &self.rules, usecase, today),
                )
            }),
        )
    }

    /// Run the three screens in parallel and wait for all of them
    ///
    /// A failing screen does not stop the others. Once all three have
    /// finished, any failure turns the run into
    /// [`MonitorError::ScreeningFailed`], which still carries the tables of
    /// the screens that succeeded.
    pub async fn screen_concurrently(
        &self,
        window: Arc<Vec<Transaction>>,
        today: NaiveDate,
    ) -> Result<ScreeningReport, MonitorError> {
        debug!(rows = window.len(), "Screening window snapshot");

        let spawn = |usecase: Usecase| {
            let window = Arc::clone(&window);
            let rules = self.rules;
            tokio::task::spawn_blocking(move || {
                detect_limit_violations(&window, &rules, usecase, today)
            })
        };

        let (single, sum_received, exchange) = tokio::join!(
            spawn(Usecase::Single),
            spawn(Usecase::SumReceived),
            spawn(Usecase::Exchange)
        );

        let outcomes = [
            (Usecase::Single, single),
            (Usecase::SumReceived, sum_received),
            (Usecase::Exchange, exchange),
        ]
        .map(|(usecase, joined)| (usecase, flatten_join(usecase, joined)));

        let report = ScreeningReport::from_outcomes(yesterday(today), outcomes);

        if report.has_failures() {
            warn!(
                run_id = %report.run_id,
                failures = %report.failure_summary(),
                "Screening finished with failed screens"
            );
            return Err(MonitorError::ScreeningFailed(Box::new(report)));
        }

        info!(
            run_id = %report.run_id,
            status = ?report.status,
            violations = report.violation_count(),
            "Screening finished"
        );
        Ok(report)
    }
}

fn flatten_join(
    usecase: Usecase,
    joined: Result<Result<ViolationTable, MonitorError>, JoinError>,
) -> Result<ViolationTable, MonitorError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => Err(MonitorError::ScreenAborted {
            usecase,
            reason: e.to_string(),
        }),
    }
}
