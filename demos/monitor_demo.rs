//! Transaction monitoring example
//!
//! This example runs two days of limit monitoring against in-memory
//! collaborators: a quiet day, then a day with violations in every usecase.

use chrono::{Duration, Utc};
use limit_monitor::collaborators::{InMemorySheets, InMemoryStore, LoggingChannel};
use limit_monitor::window::{past_date, sheet_name};
use limit_monitor::{
    MonitorConfig, RuleSheet, RunOutcome, Transaction, TransactionMonitor, Transfer,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Transaction Limit Monitor ===\n");

    let rules = RuleSheet::from_json(
        r#"[
            {"Usecase": "Single transfer", "Period (days)": null, "Limit": 10000},
            {"Usecase": "Total Sum recieved for 1 person", "Period (days)": 7, "Limit": 25000},
            {"Usecase": "Sum between 2 people", "Period (days)": 3, "Limit": 15000}
        ]"#,
    )?;

    let sheets = Arc::new(InMemorySheets::new(rules));
    let store = Arc::new(InMemoryStore::<Vec<Transaction>>::new());
    let alerts = Arc::new(InMemoryStore::<String>::new());

    let config = MonitorConfig {
        recipients: vec!["compliance@example.com".to_string()],
        ..MonitorConfig::default()
    };
    let monitor = TransactionMonitor::new(
        config,
        sheets.clone(),
        sheets.clone(),
        store,
        alerts.clone(),
        Arc::new(LoggingChannel),
    )?;

    let today = Utc::now().date_naive();
    let day_before = today - Duration::days(1);

    // 1. Bootstrap the window from the last week of sheets
    println!("1. Preparing Window");
    sheets
        .insert_batch(
            sheet_name(past_date(today, 3)),
            vec![
                Transfer::new("ACCT-1001", "ACCT-2002", 9000.0),
                Transfer::new("ACCT-3003", "ACCT-2002", 8000.0),
            ],
        )
        .await;
    let rows = monitor.prepare_window(day_before).await?;
    println!("   Rows in window: {}", rows);
    println!();

    // 2. A day without new data
    println!("2. Run Without New Data");
    let outcome = monitor.run(day_before).await?;
    println!("   Outcome: {:?}", outcome);
    println!();

    // 3. Yesterday's batch arrives
    println!("3. Run With Yesterday's Batch");
    sheets
        .insert_batch(
            sheet_name(past_date(today, 0)),
            vec![
                Transfer::new("ACCT-1001", "ACCT-2002", 12000.0),
                Transfer::new("ACCT-4004", "ACCT-5005", 7000.0),
                Transfer::new("ACCT-5005", "ACCT-4004", 9000.0),
            ],
        )
        .await;

    match monitor.run(today).await? {
        RunOutcome::Screened(report) => {
            println!("   Run ID: {}", report.run_id);
            println!("   Status: {:?}", report.status);
            println!("   Violations: {}", report.violation_count());
            println!("   Report:\n{}", report.to_json()?);
        }
        RunOutcome::NoNewData => println!("   No new data"),
    }
    println!();

    println!("4. Stored Alerts");
    for key in alerts.keys().await {
        println!("   {}", key);
    }

    Ok(())
}
