//! # Limit Monitor
//!
//! Periodic screening of a rolling window of financial transfers against
//! configurable per-usecase limit rules.
//!
//! ## Features
//!
//! - **Rule Extraction**: Per-usecase time ranges and limits read from a rules sheet
//! - **Rolling Window**: Daily batches merged into a retained N-day transaction window
//! - **Single Transfer Screen**: Individual transfers above the limit
//! - **Sum Received Screen**: Total received per destination above the limit
//! - **Exchange Screen**: Total exchanged between two parties (either direction) above the limit
//! - **Concurrent Screening**: The three screens run in parallel over one immutable snapshot
//! - **Structured Reports**: Pass/fail status plus per-usecase violation tables
//!
//! The engine does not fetch or store anything itself. Transaction sources,
//! stores, alert stores and notification channels are collaborators behind
//! the traits in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod monitor;
pub mod pairs;
pub mod report;
pub mod rules;
pub mod screens;
pub mod window;

pub use collaborators::{
    AlertNotification, AlertStore, NotificationChannel, RuleSource, TransactionSource,
    TransactionStore,
};
pub use config::MonitorConfig;
pub use engine::ScreeningEngine;
pub use monitor::{RunOutcome, TransactionMonitor};
pub use pairs::{canonical_pair, PairKey};
pub use report::{build_report, ReportStatus, ScreeningReport};
pub use rules::{RuleField, RuleRow, RuleSet, RuleSheet, UsecaseRule};
pub use screens::{ExchangeViolation, ReceivedViolation, SingleViolation, ViolationTable};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monitoring errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Missing rule: no {field} configured for usecase {usecase}")]
    MissingRule { usecase: Usecase, field: RuleField },

    #[error("Rule lookup failed for {usecase}/{field}: expected exactly one row, found {matches}")]
    RuleLookup {
        usecase: Usecase,
        field: RuleField,
        matches: usize,
    },

    #[error("Invalid rule value for {usecase}/{field}: {value}")]
    InvalidRule {
        usecase: Usecase,
        field: RuleField,
        value: f64,
    },

    #[error("Usecase {usecase} needs {required} days of history but the window retains {retained}")]
    WindowTooShort {
        usecase: Usecase,
        required: u32,
        retained: u32,
    },

    #[error("Malformed dataset for {usecase}: {reason}")]
    MalformedDataset { usecase: Usecase, reason: String },

    #[error("Screen {usecase} aborted: {reason}")]
    ScreenAborted { usecase: Usecase, reason: String },

    #[error("Transaction window unavailable: {0}")]
    WindowUnavailable(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Screening failed: {}", .0.failure_summary())]
    ScreeningFailed(Box<ScreeningReport>),
}

/// Violation category screened by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Usecase {
    Single,
    SumReceived,
    Exchange,
}

impl Usecase {
    /// All usecases in report order
    pub const ALL: [Usecase; 3] = [Usecase::Single, Usecase::SumReceived, Usecase::Exchange];

    pub fn as_str(&self) -> &'static str {
        match self {
            Usecase::Single => "single",
            Usecase::SumReceived => "sum_received",
            Usecase::Exchange => "exchange",
        }
    }

    /// Label of this usecase in the `Usecase` column of the rules sheet.
    ///
    /// These strings are shared with existing rule sheets and must stay verbatim.
    pub fn rule_label(&self) -> &'static str {
        match self {
            Usecase::Single => "Single transfer",
            Usecase::SumReceived => "Total Sum recieved for 1 person",
            Usecase::Exchange => "Sum between 2 people",
        }
    }

    pub fn from_rule_label(label: &str) -> Option<Usecase> {
        let label = label.trim();
        Usecase::ALL.into_iter().find(|u| u.rule_label() == label)
    }
}

impl std::fmt::Display for Usecase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transfer row as delivered in a daily batch, before it is dated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    #[serde(rename = "Source", alias = "source")]
    pub source: String,
    #[serde(rename = "Destination", alias = "destination")]
    pub destination: String,
    #[serde(rename = "Sum transfered", alias = "amount")]
    pub amount: f64,
}

impl Transfer {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, amount: f64) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            amount,
        }
    }

    /// Stamp the transfer with the day it belongs to
    pub fn dated(self, date: NaiveDate) -> Transaction {
        Transaction {
            source: self.source,
            destination: self.destination,
            amount: self.amount,
            date,
        }
    }
}

/// A dated transfer held in the rolling window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(rename = "Source", alias = "source")]
    pub source: String,
    #[serde(rename = "Destination", alias = "destination")]
    pub destination: String,
    #[serde(rename = "Sum transfered", alias = "amount")]
    pub amount: f64,
    #[serde(rename = "Date", alias = "date")]
    pub date: NaiveDate,
}

impl Transaction {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        amount: f64,
        date: NaiveDate,
    ) -> Self {
        Transfer::new(source, destination, amount).dated(date)
    }
}
