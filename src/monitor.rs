//! Daily monitoring run
//!
//! One run walks `Idle -> ExtractRules -> WindowReady -> Screening ->
//! Aggregated -> Done`. Rule and window failures abort before any screen
//! starts; screen failures are collected and reported once all screens
//! have finished.

use crate::collaborators::{
    AlertNotification, AlertStore, NotificationChannel, RuleSource, TransactionSource,
    TransactionStore,
};
use crate::config::MonitorConfig;
use crate::engine::ScreeningEngine;
use crate::report::{alert_key, ScreeningReport, SUMMARY_ALERT_SUFFIX};
use crate::rules::RuleSet;
use crate::window::{has_date, past_date, refresh, roll, sheet_name, yesterday};
use crate::{MonitorError, Transaction};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Stage of a monitoring run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ExtractRules,
    WindowReady,
    Screening,
    Aggregated,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "IDLE",
            RunState::ExtractRules => "EXTRACT_RULES",
            RunState::WindowReady => "WINDOW_READY",
            RunState::Screening => "SCREENING",
            RunState::Aggregated => "AGGREGATED",
            RunState::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Yesterday's batch is not in the source yet
    NoNewData,
    Screened(ScreeningReport),
}

/// Transaction monitoring service
pub struct TransactionMonitor {
    config: MonitorConfig,
    source: Arc<dyn TransactionSource>,
    rule_source: Arc<dyn RuleSource>,
    store: Arc<dyn TransactionStore>,
    alerts: Arc<dyn AlertStore>,
    channel: Arc<dyn NotificationChannel>,
}

impl TransactionMonitor {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn TransactionSource>,
        rule_source: Arc<dyn RuleSource>,
        store: Arc<dyn TransactionStore>,
        alerts: Arc<dyn AlertStore>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            rule_source,
            store,
            alerts,
            channel,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Build the window from scratch out of the last `window_days` sheets
    ///
    /// Returns the number of stored transactions.
    pub async fn prepare_window(&self, today: NaiveDate) -> Result<usize, MonitorError> {
        let mut window = Vec::new();

        for days_ago in 0..self.config.window_days {
            let sheet = sheet_name(past_date(today, days_ago));
            match self.source.daily_batch(&sheet).await? {
                Some(batch) => window = refresh(window, batch, days_ago, today),
                None => debug!(%sheet, "No sheet for day, skipping"),
            }
        }

        let rows = window.len();
        self.store.save(&self.config.transactions_key, window).await?;
        info!(
            rows,
            window_days = self.config.window_days,
            "Prepared transaction window"
        );
        Ok(rows)
    }

    /// Sheet name of yesterday's batch, if the source has it
    pub async fn check_new_data(&self, today: NaiveDate) -> Result<Option<String>, MonitorError> {
        let sheet = sheet_name(yesterday(today));
        if self.source.has_sheet(&sheet).await? {
            Ok(Some(sheet))
        } else {
            Ok(None)
        }
    }

    /// Read the rules sheet and build an engine for the configured window
    pub async fn load_rules(&self) -> Result<ScreeningEngine, MonitorError> {
        let sheet = self.rule_source.rule_sheet().await?;
        let rules = RuleSet::from_sheet(&sheet)?;
        ScreeningEngine::new(rules, self.config.window_days)
    }

    /// Trim the stored window and append yesterday's batch, at most once a day
    pub async fn update_window(
        &self,
        sheet: &str,
        today: NaiveDate,
    ) -> Result<Vec<Transaction>, MonitorError> {
        let key = &self.config.transactions_key;
        let old = self.store.load(key).await?.ok_or_else(|| {
            MonitorError::WindowUnavailable(format!("no window stored under '{}'", key))
        })?;

        let day = yesterday(today);
        if has_date(&old, day) {
            debug!(%day, "Window already holds yesterday's batch");
            return Ok(old);
        }

        let batch = self.source.daily_batch(sheet).await?.ok_or_else(|| {
            MonitorError::Collaborator(format!("sheet '{}' disappeared from the source", sheet))
        })?;

        let window = roll(&old, batch, self.config.window_days, today);
        self.store.save(key, window.clone()).await?;
        info!(%day, rows = window.len(), "Window refreshed");
        Ok(window)
    }

    /// Run one monitoring cycle for `today`
    pub async fn run(&self, today: NaiveDate) -> Result<RunOutcome, MonitorError> {
        let mut state = RunState::Idle;
        debug!(%state, %today, "Run started");

        let Some(sheet) = self.check_new_data(today).await? else {
            info!(%today, "No new data");
            return Ok(RunOutcome::NoNewData);
        };

        state = RunState::ExtractRules;
        debug!(%state, "Loading rules");
        let engine = self.load_rules().await.map_err(|e| {
            error!(%state, error = %e, "Rule extraction failed");
            e
        })?;

        let window = self.update_window(&sheet, today).await?;
        state = RunState::WindowReady;
        debug!(%state, rows = window.len(), "Window ready");

        state = RunState::Screening;
        debug!(%state, "Screening");
        let screened = engine.screen_concurrently(Arc::new(window), today).await;

        state = RunState::Aggregated;
        let outcome = match screened {
            Ok(report) => {
                self.publish(&report).await?;
                Ok(RunOutcome::Screened(report))
            }
            Err(MonitorError::ScreeningFailed(report)) => {
                // Alerts from the screens that did finish are still published
                if let Err(e) = self.publish(&report).await {
                    error!(
                        %state,
                        run_id = %report.run_id,
                        error = %e,
                        "Publishing partial results failed"
                    );
                }
                Err(MonitorError::ScreeningFailed(report))
            }
            Err(e) => Err(e),
        };
        debug!(%state, "Results published");

        state = RunState::Done;
        debug!(%state, "Run finished");
        outcome
    }

    /// Run one monitoring cycle for the current UTC date
    pub async fn run_today(&self) -> Result<RunOutcome, MonitorError> {
        self.run(Utc::now().date_naive()).await
    }

    /// Store alert payloads and notify when the report has alerts
    async fn publish(&self, report: &ScreeningReport) -> Result<(), MonitorError> {
        if !report.has_alerts() {
            info!(run_id = %report.run_id, "Nothing suspicious");
            return Ok(());
        }

        for (usecase, table) in &report.detected {
            let payload = table
                .to_json()
                .map_err(|e| MonitorError::Collaborator(e.to_string()))?;
            let key = alert_key(report.screened_on, usecase.as_str());
            self.alerts.put(&key, payload).await?;
            info!(%key, usecase = %usecase, rows = table.len(), "Alert stored");
        }

        let notification = AlertNotification {
            date: report.screened_on,
            subject: self.config.alert_subject.clone(),
            recipients: self.config.recipients.clone(),
            report: report.clone(),
        };
        let payload = notification
            .to_json()
            .map_err(|e| MonitorError::Collaborator(e.to_string()))?;
        self.alerts
            .put(&alert_key(report.screened_on, SUMMARY_ALERT_SUFFIX), payload)
            .await?;
        self.channel.send(&notification).await?;

        info!(
            run_id = %report.run_id,
            violations = report.violation_count(),
            recipients = notification.recipients.len(),
            "Alert notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemorySheets, InMemoryStore, RecordingChannel};
    use crate::rules::RuleSheet;
    use crate::{Transfer, Usecase};
    use async_trait::async_trait;

    /// Alert store whose backend is down
    struct UnreachableAlerts;

    #[async_trait]
    impl AlertStore for UnreachableAlerts {
        async fn put(&self, key: &str, _payload: String) -> Result<(), MonitorError> {
            Err(MonitorError::Collaborator(format!("cannot store '{}'", key)))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn create_rules() -> RuleSheet {
        RuleSheet::new()
            .with_row("Single transfer", [("Limit", 100.0)])
            .with_row(
                "Total Sum recieved for 1 person",
                [("Period (days)", 7.0), ("Limit", 200.0)],
            )
            .with_row("Sum between 2 people", [("Period (days)", 7.0), ("Limit", 100.0)])
    }

    struct Harness {
        sheets: Arc<InMemorySheets>,
        store: Arc<InMemoryStore<Vec<Transaction>>>,
        alerts: Arc<InMemoryStore<String>>,
        channel: Arc<RecordingChannel>,
        monitor: TransactionMonitor,
    }

    fn create_harness(sheets: InMemorySheets) -> Harness {
        let sheets = Arc::new(sheets);
        let store = Arc::new(InMemoryStore::<Vec<Transaction>>::new());
        let alerts = Arc::new(InMemoryStore::<String>::new());
        let channel = Arc::new(RecordingChannel::new());
        let monitor = TransactionMonitor::new(
            MonitorConfig::default(),
            sheets.clone(),
            sheets.clone(),
            store.clone(),
            alerts.clone(),
            channel.clone(),
        )
        .unwrap();

        Harness {
            sheets,
            store,
            alerts,
            channel,
            monitor,
        }
    }

    #[test]
    fn test_run_state_names() {
        assert_eq!(RunState::ExtractRules.to_string(), "EXTRACT_RULES");
        assert_eq!(RunState::WindowReady.to_string(), "WINDOW_READY");
    }

    #[tokio::test]
    async fn test_no_new_data() {
        let harness = create_harness(InMemorySheets::new(create_rules()));
        harness.monitor.prepare_window(today()).await.unwrap();

        let outcome = harness.monitor.run(today()).await.unwrap();
        assert_eq!(outcome, RunOutcome::NoNewData);
        assert!(harness.channel.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_window_dates_each_sheet() {
        let sheets = InMemorySheets::new(create_rules())
            .with_batch("09.03.2024", vec![Transfer::new("A", "B", 1.0)])
            .with_batch("05.03.2024", vec![Transfer::new("C", "D", 2.0)])
            .with_batch("01.03.2024", vec![Transfer::new("E", "F", 3.0)]);
        let harness = create_harness(sheets);

        let rows = harness.monitor.prepare_window(today()).await.unwrap();
        // 01.03 is outside a 7-day window ending 09.03
        assert_eq!(rows, 2);

        let window = harness.store.get("transactions").await.unwrap();
        assert_eq!(window[0].date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(window[1].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[tokio::test]
    async fn test_update_window_is_idempotent() {
        let sheets = InMemorySheets::new(create_rules())
            .with_batch("09.03.2024", vec![Transfer::new("A", "B", 1.0)]);
        let harness = create_harness(sheets);
        harness.store.insert("transactions", Vec::new()).await;

        let first = harness.monitor.update_window("09.03.2024", today()).await.unwrap();
        let second = harness.monitor.update_window("09.03.2024", today()).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_missing_window_aborts_run() {
        let sheets = InMemorySheets::new(create_rules())
            .with_batch("09.03.2024", vec![Transfer::new("A", "B", 1.0)]);
        let harness = create_harness(sheets);

        let err = harness.monitor.run(today()).await.unwrap_err();
        assert!(matches!(err, MonitorError::WindowUnavailable(_)));
    }

    #[tokio::test]
    async fn test_alerts_are_stored_and_sent() {
        let sheets = InMemorySheets::new(create_rules())
            .with_batch("09.03.2024", vec![Transfer::new("A", "B", 150.0)]);
        let harness = create_harness(sheets);
        harness.store.insert("transactions", Vec::new()).await;

        let outcome = harness.monitor.run(today()).await.unwrap();
        let RunOutcome::Screened(report) = outcome else {
            panic!("expected a screening report");
        };
        assert!(report.has_alerts());

        assert_eq!(
            harness.alerts.keys().await,
            vec![
                "2024-03-09_alerts".to_string(),
                "2024-03-09_exchange".to_string(),
                "2024-03-09_single".to_string(),
            ]
        );
        let sent = harness.channel.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].report, report);
        assert!(harness.sheets.has_sheet("09.03.2024").await.unwrap());
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        let sheets = Arc::new(InMemorySheets::new(create_rules()));
        let config = MonitorConfig {
            window_days: 200_000_000,
            ..MonitorConfig::default()
        };

        let result = TransactionMonitor::new(
            config,
            sheets.clone(),
            sheets,
            Arc::new(InMemoryStore::<Vec<Transaction>>::new()),
            Arc::new(InMemoryStore::<String>::new()),
            Arc::new(RecordingChannel::new()),
        );
        assert!(matches!(result, Err(MonitorError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_screen_failures_survive_publish_failure() {
        let sheets = Arc::new(
            InMemorySheets::new(create_rules())
                .with_batch("09.03.2024", vec![Transfer::new("", "B", 500.0)]),
        );
        let store = Arc::new(InMemoryStore::<Vec<Transaction>>::new());
        store.insert("transactions", Vec::new()).await;
        let channel = Arc::new(RecordingChannel::new());
        let monitor = TransactionMonitor::new(
            MonitorConfig::default(),
            sheets.clone(),
            sheets,
            store,
            Arc::new(UnreachableAlerts),
            channel.clone(),
        )
        .unwrap();

        let err = monitor.run(today()).await.unwrap_err();
        let MonitorError::ScreeningFailed(report) = err else {
            panic!("expected the screen failures");
        };
        assert!(report.failures.contains_key(&Usecase::Single));
        assert!(report.failures.contains_key(&Usecase::Exchange));
        assert!(report.get(Usecase::SumReceived).is_some());
        assert!(channel.sent().await.is_empty());
    }
}
