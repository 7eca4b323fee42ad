//! Contracts of the I/O collaborators around the engine
//!
//! The monitor talks to spreadsheets, object stores and mail through these
//! traits only. The in-memory implementations back the tests and the demo.

use crate::report::ScreeningReport;
use crate::rules::RuleSheet;
use crate::{MonitorError, Transaction, Transfer};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Daily transfer batches keyed by sheet name (`DD.MM.YYYY`)
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn daily_batch(&self, sheet: &str) -> Result<Option<Vec<Transfer>>, MonitorError>;

    async fn has_sheet(&self, sheet: &str) -> Result<bool, MonitorError>;
}

/// Source of the rules sheet
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn rule_sheet(&self) -> Result<RuleSheet, MonitorError>;
}

/// Keyed storage of the rolling window
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<Transaction>>, MonitorError>;

    async fn save(&self, key: &str, window: Vec<Transaction>) -> Result<(), MonitorError>;
}

/// Keyed storage of alert payloads (`{date}_{usecase}`)
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn put(&self, key: &str, payload: String) -> Result<(), MonitorError>;
}

/// Delivery of alert notifications; rendering is up to the channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: &AlertNotification) -> Result<(), MonitorError>;
}

/// Notification handed to the channel when alerts are found
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertNotification {
    pub date: NaiveDate,
    pub subject: String,
    pub recipients: Vec<String>,
    pub report: ScreeningReport,
}

impl AlertNotification {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Spreadsheet stand-in holding daily batches and the rules sheet
#[derive(Debug, Default)]
pub struct InMemorySheets {
    batches: RwLock<HashMap<String, Vec<Transfer>>>,
    rules: RwLock<RuleSheet>,
}

impl InMemorySheets {
    pub fn new(rules: RuleSheet) -> Self {
        Self {
            batches: RwLock::new(HashMap::new()),
            rules: RwLock::new(rules),
        }
    }

    pub fn with_batch(mut self, sheet: impl Into<String>, batch: Vec<Transfer>) -> Self {
        self.batches.get_mut().insert(sheet.into(), batch);
        self
    }

    pub async fn insert_batch(&self, sheet: impl Into<String>, batch: Vec<Transfer>) {
        self.batches.write().await.insert(sheet.into(), batch);
    }

    pub async fn set_rules(&self, rules: RuleSheet) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl TransactionSource for InMemorySheets {
    async fn daily_batch(&self, sheet: &str) -> Result<Option<Vec<Transfer>>, MonitorError> {
        Ok(self.batches.read().await.get(sheet).cloned())
    }

    async fn has_sheet(&self, sheet: &str) -> Result<bool, MonitorError> {
        Ok(self.batches.read().await.contains_key(sheet))
    }
}

#[async_trait]
impl RuleSource for InMemorySheets {
    async fn rule_sheet(&self) -> Result<RuleSheet, MonitorError> {
        Ok(self.rules.read().await.clone())
    }
}

/// Key-value store for windows or alert payloads
#[derive(Debug)]
pub struct InMemoryStore<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone + Send + Sync> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: T) {
        self.entries.write().await.insert(key.into(), value);
    }

    /// Stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<T: Clone + Send + Sync> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore<Vec<Transaction>> {
    async fn load(&self, key: &str) -> Result<Option<Vec<Transaction>>, MonitorError> {
        Ok(self.get(key).await)
    }

    async fn save(&self, key: &str, window: Vec<Transaction>) -> Result<(), MonitorError> {
        self.insert(key, window).await;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for InMemoryStore<String> {
    async fn put(&self, key: &str, payload: String) -> Result<(), MonitorError> {
        self.insert(key, payload).await;
        Ok(())
    }
}

/// Channel that keeps every notification it is asked to send
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: RwLock<Vec<AlertNotification>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<AlertNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, notification: &AlertNotification) -> Result<(), MonitorError> {
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}

/// Channel that writes notifications to the log
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    async fn send(&self, notification: &AlertNotification) -> Result<(), MonitorError> {
        let usecases: Vec<&str> = notification
            .report
            .detected
            .keys()
            .map(|usecase| usecase.as_str())
            .collect();
        info!(
            channel = "log",
            date = %notification.date,
            subject = %notification.subject,
            recipients = ?notification.recipients,
            violations = notification.report.violation_count(),
            usecases = ?usecases,
            "Alert notification"
        );
        Ok(())
    }
}
