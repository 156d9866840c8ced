use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use atelier_catalog::ProductId;
use atelier_core::{AggregateId, FixedClock, TenantId};
use atelier_infra::{InMemoryBatchStore, StockLedger};
use atelier_stock::{
    plan_consumption, BatchId, BatchStatus, ConsumptionPolicy, ConsumptionReason, RestockSource,
    StockBatch,
};

fn make_batches(count: usize) -> Vec<StockBatch> {
    let product_id = ProductId::new(AggregateId::new());
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| StockBatch {
            id: BatchId::new(AggregateId::new()),
            product_id,
            quantity: 10,
            remaining_quantity: 10,
            cost_price: 100 + (i as i64 % 7) * 10,
            status: BatchStatus::Active,
            created_at: base + Duration::seconds(i as i64),
        })
        .collect()
}

fn bench_plan_consumption(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_consumption");

    for &count in &[10usize, 100, 1000] {
        let batches = make_batches(count);
        // Withdraw half the available stock so the planner walks ~half the list.
        let quantity = (count as i64 * 10) / 2;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fifo", count), &batches, |b, batches| {
            b.iter(|| {
                plan_consumption(
                    black_box(batches),
                    black_box(quantity),
                    ConsumptionPolicy::Fifo,
                )
                .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("lifo", count), &batches, |b, batches| {
            b.iter(|| {
                plan_consumption(
                    black_box(batches),
                    black_box(quantity),
                    ConsumptionPolicy::Lifo,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_ledger_round_trip(c: &mut Criterion) {
    c.bench_function("ledger_restock_and_consume", |b| {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ledger = StockLedger::new(
            Arc::new(InMemoryBatchStore::new()),
            Arc::new(FixedClock::new(start)),
        );
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());

        b.iter(|| {
            ledger
                .restock(tenant_id, product_id, 10, 100, RestockSource::Purchase)
                .unwrap();
            ledger
                .consume(
                    tenant_id,
                    product_id,
                    black_box(10),
                    ConsumptionPolicy::Fifo,
                    ConsumptionReason::Sale,
                )
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_plan_consumption, bench_ledger_round_trip);
criterion_main!(benches);
