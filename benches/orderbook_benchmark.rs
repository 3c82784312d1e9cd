//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_depth_sync::orderbook::{OrderBookSynchronizer, PriceLevelSet, Side, SyncState};
use market_depth_sync::parser::{DepthUpdate, OrderBookSnapshot, PriceLevel};
use market_depth_sync::store::{MemorySink, StoreWriter};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

fn create_snapshot(levels: usize) -> OrderBookSnapshot {
    let bids: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(Decimal::from(50000 - i as i64), Decimal::from_str("1.5").unwrap()))
        .collect();

    let asks: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(Decimal::from(50001 + i as i64), Decimal::from_str("1.5").unwrap()))
        .collect();

    OrderBookSnapshot {
        last_update_id: 1000,
        bids,
        asks,
    }
}

fn create_update(first: u64, last: u64) -> DepthUpdate {
    DepthUpdate {
        event_type: "depthUpdate".to_string(),
        event_time: 1672531200000,
        symbol: "BTCUSDT".to_string(),
        first_update_id: first,
        final_update_id: last,
        bids: vec![PriceLevel::new(
            Decimal::from(49999),
            Decimal::from_str("2.0").unwrap(),
        )],
        asks: vec![PriceLevel::new(
            Decimal::from(50001),
            Decimal::from_str("2.5").unwrap(),
        )],
    }
}

fn benchmark_level_set(c: &mut Criterion) {
    let snapshot = create_snapshot(100);

    c.bench_function("upsert_100_levels", |b| {
        b.iter(|| {
            let mut set = PriceLevelSet::new(Side::Bid);
            for level in &snapshot.bids {
                set.upsert(black_box(level.price), level.quantity);
            }
            set
        })
    });

    let mut set = PriceLevelSet::new(Side::Bid);
    for level in &snapshot.bids {
        set.upsert(level.price, level.quantity);
    }

    c.bench_function("level_snapshot_100", |b| {
        b.iter(|| black_box(set.snapshot()))
    });

    c.bench_function("level_top_10", |b| b.iter(|| black_box(set.top(10))));
}

fn benchmark_admission(c: &mut Criterion) {
    let mut state = SyncState::new();
    state.begin_seeding();
    state.seeded(1000);
    state.commit(1001);

    c.bench_function("admit_contiguous", |b| {
        b.iter(|| black_box(state.admit(black_box(1002), black_box(1005))))
    });
}

fn benchmark_apply_diff(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let snapshot = create_snapshot(100);

    let writer = StoreWriter::new(Arc::new(MemorySink::new()), "btcusdt");
    let mut sync = OrderBookSynchronizer::new("btcusdt", writer);
    runtime.block_on(sync.seed(&snapshot));

    let mut next_id = 1001;
    c.bench_function("apply_diff_memory_sink", |b| {
        b.iter(|| {
            let update = create_update(next_id, next_id);
            next_id += 1;
            runtime.block_on(sync.apply_diff(black_box(&update))).unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_level_set,
    benchmark_admission,
    benchmark_apply_diff
);
criterion_main!(benches);
