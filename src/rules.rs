//! Rule extraction: per-usecase time ranges and limits
//!
//! The rules sheet is a wide table keyed by the `Usecase` column with one
//! column per rule field. It is flattened into [`RuleRow`]s, and every
//! `(usecase, field)` pair is then resolved through [`FIELD_POLICIES`].

use crate::{MonitorError, Usecase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Single transfers are only ever checked against yesterday's data
pub const SINGLE_TRANSFER_DAYS: u32 = 1;

/// Longest history a rule or the window may span (ten years)
pub const MAX_TIME_RANGE_DAYS: u32 = 3660;

/// Rule field configured per usecase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    TimeRangeDays,
    Limit,
}

impl RuleField {
    pub const ALL: [RuleField; 2] = [RuleField::TimeRangeDays, RuleField::Limit];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleField::TimeRangeDays => "time_range_days",
            RuleField::Limit => "limit",
        }
    }

    /// Column name of this field in the rules sheet
    pub fn column(&self) -> &'static str {
        match self {
            RuleField::TimeRangeDays => "Period (days)",
            RuleField::Limit => "Limit",
        }
    }
}

impl std::fmt::Display for RuleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a `(usecase, field)` pair is resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldPolicy {
    /// Exactly one numeric row must be configured
    Required,
    /// Always this value, whatever the sheet says
    Fixed(f64),
}

/// Resolution policy for every rule field of every usecase
pub const FIELD_POLICIES: [(Usecase, RuleField, FieldPolicy); 6] = [
    (
        Usecase::Single,
        RuleField::TimeRangeDays,
        FieldPolicy::Fixed(SINGLE_TRANSFER_DAYS as f64),
    ),
    (Usecase::Single, RuleField::Limit, FieldPolicy::Required),
    (
        Usecase::SumReceived,
        RuleField::TimeRangeDays,
        FieldPolicy::Required,
    ),
    (Usecase::SumReceived, RuleField::Limit, FieldPolicy::Required),
    (Usecase::Exchange, RuleField::TimeRangeDays, FieldPolicy::Required),
    (Usecase::Exchange, RuleField::Limit, FieldPolicy::Required),
];

fn policy_for(usecase: Usecase, field: RuleField) -> FieldPolicy {
    FIELD_POLICIES
        .iter()
        .find(|(u, f, _)| *u == usecase && *f == field)
        .map(|(_, _, policy)| *policy)
        .unwrap_or(FieldPolicy::Required)
}

/// One configured value: `(usecase, field) -> value`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RuleRow {
    pub usecase: Usecase,
    pub field: RuleField,
    pub value: f64,
}

impl RuleRow {
    pub fn new(usecase: Usecase, field: RuleField, value: f64) -> Self {
        Self {
            usecase,
            field,
            value,
        }
    }
}

/// Cell of the rules sheet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RuleCell {
    Number(f64),
    Text(String),
    Empty,
    /// Booleans, lists and objects; never a rule value
    Other(serde_json::Value),
}

impl RuleCell {
    /// Numeric content of the cell; numeric text counts, blanks do not
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RuleCell::Number(value) => Some(*value),
            RuleCell::Text(text) => text.trim().parse::<f64>().ok(),
            RuleCell::Empty | RuleCell::Other(_) => None,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            RuleCell::Empty => true,
            RuleCell::Text(text) => text.trim().is_empty(),
            RuleCell::Number(_) | RuleCell::Other(_) => false,
        }
    }
}

impl From<f64> for RuleCell {
    fn from(value: f64) -> Self {
        RuleCell::Number(value)
    }
}

impl From<&str> for RuleCell {
    fn from(value: &str) -> Self {
        RuleCell::Text(value.to_string())
    }
}

/// Row of the rules sheet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSheetRow {
    #[serde(rename = "Usecase")]
    pub usecase: String,
    #[serde(flatten)]
    pub cells: BTreeMap<String, RuleCell>,
}

/// The rules sheet as stored by the configuration source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RuleSheet {
    rows: Vec<RuleSheetRow>,
}

impl RuleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a sheet from a JSON array of row objects
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        serde_json::from_str(json)
            .map_err(|e| MonitorError::InvalidConfig(format!("Unreadable rules sheet: {}", e)))
    }

    /// Append a row built from `(column, cell)` pairs
    pub fn with_row<C: Into<RuleCell>>(
        mut self,
        usecase: &str,
        cells: impl IntoIterator<Item = (&'static str, C)>,
    ) -> Self {
        self.rows.push(RuleSheetRow {
            usecase: usecase.to_string(),
            cells: cells
                .into_iter()
                .map(|(column, cell)| (column.to_string(), cell.into()))
                .collect(),
        });
        self
    }

    pub fn rows(&self) -> &[RuleSheetRow] {
        &self.rows
    }

    /// Flatten the sheet into one [`RuleRow`] per numeric cell
    pub fn to_rule_rows(&self) -> Vec<RuleRow> {
        let mut rule_rows = Vec::new();

        for row in &self.rows {
            let Some(usecase) = Usecase::from_rule_label(&row.usecase) else {
                debug!(label = %row.usecase, "Ignoring rules sheet row with unknown usecase");
                continue;
            };

            for field in RuleField::ALL {
                let Some(cell) = row.cells.get(field.column()) else {
                    continue;
                };
                match cell.as_number() {
                    Some(value) => rule_rows.push(RuleRow::new(usecase, field, value)),
                    None if cell.is_blank() => {}
                    None => warn!(
                        usecase = %usecase,
                        column = field.column(),
                        cell = ?cell,
                        "Non-numeric rule cell ignored"
                    ),
                }
            }
        }

        rule_rows
    }
}

/// Time range and limit of one usecase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UsecaseRule {
    pub time_range_days: u32,
    pub limit: f64,
}

/// Resolved rules for every usecase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    single: UsecaseRule,
    sum_received: UsecaseRule,
    exchange: UsecaseRule,
}

impl RuleSet {
    /// Resolve the rules of every usecase, failing on the first bad field
    pub fn extract(rows: &[RuleRow]) -> Result<Self, MonitorError> {
        Ok(Self {
            single: resolve_usecase(rows, Usecase::Single)?,
            sum_received: resolve_usecase(rows, Usecase::SumReceived)?,
            exchange: resolve_usecase(rows, Usecase::Exchange)?,
        })
    }

    pub fn from_sheet(sheet: &RuleSheet) -> Result<Self, MonitorError> {
        Self::extract(&sheet.to_rule_rows())
    }

    pub fn get(&self, usecase: Usecase) -> &UsecaseRule {
        match usecase {
            Usecase::Single => &self.single,
            Usecase::SumReceived => &self.sum_received,
            Usecase::Exchange => &self.exchange,
        }
    }

    /// Longest history any usecase looks at
    pub fn max_time_range_days(&self) -> u32 {
        Usecase::ALL
            .iter()
            .map(|u| self.get(*u).time_range_days)
            .max()
            .unwrap_or(SINGLE_TRANSFER_DAYS)
    }

    /// Check that a window retaining `retained_days` covers every usecase
    pub fn ensure_covered_by(&self, retained_days: u32) -> Result<(), MonitorError> {
        for usecase in Usecase::ALL {
            let required = self.get(usecase).time_range_days;
            if required > retained_days {
                return Err(MonitorError::WindowTooShort {
                    usecase,
                    required,
                    retained: retained_days,
                });
            }
        }
        Ok(())
    }
}

fn resolve_usecase(rows: &[RuleRow], usecase: Usecase) -> Result<UsecaseRule, MonitorError> {
    let days = resolve_field(rows, usecase, RuleField::TimeRangeDays)?;
    if !days.is_finite()
        || days < 1.0
        || days.fract() != 0.0
        || days > f64::from(MAX_TIME_RANGE_DAYS)
    {
        return Err(MonitorError::InvalidRule {
            usecase,
            field: RuleField::TimeRangeDays,
            value: days,
        });
    }

    let limit = resolve_field(rows, usecase, RuleField::Limit)?;
    if !limit.is_finite() {
        return Err(MonitorError::InvalidRule {
            usecase,
            field: RuleField::Limit,
            value: limit,
        });
    }

    Ok(UsecaseRule {
        time_range_days: days as u32,
        limit,
    })
}

fn resolve_field(rows: &[RuleRow], usecase: Usecase, field: RuleField) -> Result<f64, MonitorError> {
    let matches: Vec<f64> = rows
        .iter()
        .filter(|r| r.usecase == usecase && r.field == field)
        .map(|r| r.value)
        .collect();

    match policy_for(usecase, field) {
        FieldPolicy::Fixed(value) => {
            if matches.iter().any(|configured| *configured != value) {
                debug!(
                    usecase = %usecase,
                    field = %field,
                    configured = ?matches,
                    fixed = value,
                    "Configured rule value overridden by fixed policy"
                );
            }
            Ok(value)
        }
        FieldPolicy::Required => match matches.as_slice() {
            [] => Err(MonitorError::MissingRule { usecase, field }),
            [value] => Ok(*value),
            _ => Err(MonitorError::RuleLookup {
                usecase,
                field,
                matches: matches.len(),
            }),
        },
    }
}
