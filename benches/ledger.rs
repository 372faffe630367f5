use chrono::{Duration, TimeZone, Utc};
use costbook::{LedgerConfig, ledger::Ledger};
use costbook_core::retry::RetryConfig;
use costbook_core::timezone::TimezoneConfig;
use costbook_core::types::{DateRange, UsageEvent, UserId};
use costbook_pricing::{CostCalculator, PricingTable};
use costbook_store::MemoryStore;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

fn create_ledger() -> Arc<Ledger> {
    let config = LedgerConfig::default()
        .with_timezone(TimezoneConfig::utc())
        .with_retry(RetryConfig::disabled());
    Arc::new(Ledger::new(
        Arc::new(MemoryStore::new()),
        Arc::new(CostCalculator::new(Arc::new(PricingTable::builtin()))),
        config,
    ))
}

fn create_events(count: usize, users: i64) -> Vec<UsageEvent> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            UsageEvent::new(
                UserId::new(i as i64 % users),
                "chat_tokens",
                (100 + i % 900) as f64,
                start + Duration::minutes(i as i64 * 7),
            )
            .with_event_id(format!("bench-{i}"))
        })
        .collect()
}

fn benchmark_record_usage(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("record_usage");
    group.sample_size(10);

    for count in [100, 1_000] {
        let events = create_events(count, 10);
        group.bench_with_input(BenchmarkId::new("sequential", count), &events, |b, events| {
            b.iter(|| {
                runtime.block_on(async {
                    let ledger = create_ledger();
                    for event in events {
                        black_box(ledger.record_usage(event.clone()).await.unwrap());
                    }
                })
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", count), &events, |b, events| {
            b.iter(|| {
                runtime.block_on(async {
                    let ledger = create_ledger();
                    let tasks: Vec<_> = events
                        .iter()
                        .cloned()
                        .map(|event| {
                            let ledger = Arc::clone(&ledger);
                            tokio::spawn(async move { ledger.record_usage(event).await })
                        })
                        .collect();
                    for task in futures::future::join_all(tasks).await {
                        black_box(task.unwrap().unwrap());
                    }
                })
            });
        });
    }

    group.finish();
}

fn benchmark_reads(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ledger = create_ledger();
    runtime.block_on(async {
        for event in create_events(5_000, 5) {
            ledger.record_usage(event).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("reads");
    group.bench_function("get_current_costs", |b| {
        b.iter(|| runtime.block_on(ledger.get_current_costs(black_box(UserId::new(3)))));
    });
    group.bench_function("get_history_all", |b| {
        b.iter(|| runtime.block_on(ledger.get_history(UserId::new(3), &DateRange::all())));
    });
    group.bench_function("usage_summary", |b| {
        b.iter(|| runtime.block_on(ledger.usage_summary(UserId::new(3), None)));
    });
    group.finish();
}

criterion_group!(benches, benchmark_record_usage, benchmark_reads);
criterion_main!(benches);
