use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use lotledger_core::{Actor, CustomerId, LotId, OrderItemId, ProductId};
use lotledger_events::NoopAuditEmitter;
use lotledger_infra::{InMemoryLedgerStore, LotLedger, LotReceipt};
use lotledger_inventory::{InventoryLot, LotStatus, NewLot};
use lotledger_orders::{NewOrderLine, SelectionPolicy, select_lots, suggest_fill};
use lotledger_production::proportional_shares;
use lotledger_products::UnitType;

type BenchLedger = LotLedger<InMemoryLedgerStore, NoopAuditEmitter>;

fn day(offset: u64) -> NaiveDate {
    let today = Utc::now().date_naive();
    today.checked_add_days(Days::new(offset)).unwrap_or(today)
}

/// A ledger holding one available lot and one confirmed single-line order.
fn setup_pick_ledger(rt: &Runtime) -> (BenchLedger, OrderItemId, LotId) {
    rt.block_on(async {
        let ledger = LotLedger::new(InMemoryLedgerStore::new(), NoopAuditEmitter);
        let actor = Actor::system();
        let product = ledger
            .register_product(&actor, "BENCH-1", "bench", UnitType::Case, None, None)
            .await
            .unwrap();
        let lot = ledger
            .receive_lot(
                &actor,
                LotReceipt {
                    product_id: product.id,
                    quantity: 1_000_000,
                    received_on: day(0),
                    expires_on: day(30),
                    origin_country: None,
                    grower_id: None,
                },
            )
            .await
            .unwrap();
        ledger
            .set_lot_status(&actor, lot.id, LotStatus::Available)
            .await
            .unwrap();
        let placed = ledger
            .place_order(
                &actor,
                CustomerId::new(),
                day(1),
                None,
                vec![NewOrderLine {
                    product_id: product.id,
                    quantity: 1_000_000,
                }],
            )
            .await
            .unwrap();
        ledger.confirm_order(&actor, placed.order.id).await.unwrap();
        (ledger, placed.items[0].id, lot.id)
    })
}

fn bench_pick_revert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pick_revert");
    group.sample_size(200);

    group.bench_function("submit_then_revert", |b| {
        let (ledger, item_id, lot_id) = setup_pick_ledger(&rt);
        let actor = Actor::system();
        b.iter(|| {
            rt.block_on(async {
                let outcome = ledger
                    .submit_pick(&actor, item_id, lot_id, black_box(3))
                    .await
                    .unwrap();
                ledger.revert_pick(&actor, outcome.pick.id).await.unwrap();
            })
        });
    });

    group.finish();
}

fn bench_proportional_shares(c: &mut Criterion) {
    let mut group = c.benchmark_group("proportional_shares");

    for sources in [2usize, 10, 100].iter() {
        let consumed: Vec<Decimal> = (1..=*sources as i64).map(Decimal::from).collect();
        group.throughput(Throughput::Elements(*sources as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sources), &consumed, |b, consumed| {
            b.iter(|| proportional_shares(black_box(consumed), black_box(Decimal::new(12345, 1))).unwrap());
        });
    }

    group.finish();
}

fn bench_lot_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("lot_selection");
    let product_id = ProductId::new();
    let policy = SelectionPolicy::default();

    for lot_count in [10usize, 100, 1000].iter() {
        let lots: Vec<InventoryLot> = (0..*lot_count as u64)
            .map(|n| {
                InventoryLot::receive(NewLot {
                    id: LotId::new(),
                    lot_number: format!("L{n:06}"),
                    product_id,
                    parent_lot_id: None,
                    quantity: 50,
                    received_on: day(0),
                    expires_on: day(n % 30 + 1),
                    origin_country: None,
                    grower_id: None,
                    created_at: Utc::now(),
                })
                .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(*lot_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lot_count), &lots, |b, lots| {
            b.iter(|| {
                let candidates = select_lots(product_id, lots.iter(), &policy, |_| 10);
                suggest_fill(&candidates, black_box(500))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pick_revert,
    bench_proportional_shares,
    bench_lot_selection
);
criterion_main!(benches);
