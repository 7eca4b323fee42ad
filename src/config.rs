//! Monitor configuration

use crate::rules::MAX_TIME_RANGE_DAYS;
use crate::MonitorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Transaction monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Days of history retained in the rolling window
    pub window_days: u32,
    /// Key of the window in the transaction store
    pub transactions_key: String,
    pub recipients: Vec<String>,
    pub alert_subject: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            transactions_key: "transactions".to_string(),
            recipients: Vec::new(),
            alert_subject: "Transaction monitoring alerts".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let config: MonitorConfig = serde_json::from_str(json)
            .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::InvalidConfig(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.window_days == 0 || self.window_days > MAX_TIME_RANGE_DAYS {
            return Err(MonitorError::InvalidConfig(format!(
                "window_days must be between 1 and {}, got {}",
                MAX_TIME_RANGE_DAYS, self.window_days
            )));
        }
        if self.transactions_key.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "transactions_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
