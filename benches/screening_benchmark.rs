//! Benchmark suite for the violation screens

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use limit_monitor::rules::{RuleField, RuleRow};
use limit_monitor::screens::{check_exchanged, check_single, check_sum_received};
use limit_monitor::{RuleSet, ScreeningEngine, Transaction, Usecase};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn create_window(size: usize) -> Vec<Transaction> {
    (0..size)
        .map(|i| {
            Transaction::new(
                format!("ACCT-{:04}", i % 97),
                format!("ACCT-{:04}", (i * 7) % 89),
                ((i % 500) as f64) * 3.5 + 1.0,
                today() - Duration::days((i % 7) as i64 + 1),
            )
        })
        .collect()
}

fn create_rules() -> RuleSet {
    RuleSet::extract(&[
        RuleRow::new(Usecase::Single, RuleField::Limit, 1500.0),
        RuleRow::new(Usecase::SumReceived, RuleField::TimeRangeDays, 7.0),
        RuleRow::new(Usecase::SumReceived, RuleField::Limit, 50_000.0),
        RuleRow::new(Usecase::Exchange, RuleField::TimeRangeDays, 3.0),
        RuleRow::new(Usecase::Exchange, RuleField::Limit, 5_000.0),
    ])
    .unwrap()
}

fn benchmark_screens(c: &mut Criterion) {
    let window = create_window(10_000);

    c.bench_function("check_single_10k", |b| {
        b.iter(|| check_single(black_box(&window), black_box(1500.0)))
    });

    c.bench_function("check_sum_received_10k", |b| {
        b.iter(|| check_sum_received(black_box(&window), black_box(50_000.0)))
    });

    c.bench_function("check_exchanged_10k", |b| {
        b.iter(|| check_exchanged(black_box(&window), black_box(5_000.0)))
    });
}

fn benchmark_engine(c: &mut Criterion) {
    let window = create_window(10_000);
    let engine = ScreeningEngine::new(create_rules(), 7).unwrap();

    c.bench_function("engine_screen_10k", |b| {
        b.iter(|| engine.screen(black_box(&window), today()))
    });
}

criterion_group!(benches, benchmark_screens, benchmark_engine);
criterion_main!(benches);
