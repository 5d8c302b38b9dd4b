use catalog::{InMemoryInventoryLedger, InventoryLedger, InventoryLedgerExt, ReservationItem};
use common::UnitRef;
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_reserve_and_restore(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryInventoryLedger::new();
    let items: Vec<ReservationItem> = (0..5)
        .map(|i| ReservationItem::new(UnitRef::variant("SKU", format!("v{i}")), 2))
        .collect();

    rt.block_on(async {
        for item in &items {
            ledger.set_stock(&item.unit, 1_000).await.unwrap();
        }
    });

    c.bench_function("ledger/reserve_restore_5_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.reserve(&items).await.unwrap();
                ledger.restore(&items).await.unwrap();
            });
        });
    });
}

fn bench_rejected_reservation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryInventoryLedger::new();
    let items = vec![
        ReservationItem::new(UnitRef::product("A"), 1),
        ReservationItem::new(UnitRef::product("B"), 1),
        ReservationItem::new(UnitRef::product("EMPTY"), 1),
    ];

    rt.block_on(async {
        ledger.set_stock(&UnitRef::product("A"), 1_000).await.unwrap();
        ledger.set_stock(&UnitRef::product("B"), 1_000).await.unwrap();
        ledger.set_stock(&UnitRef::product("EMPTY"), 0).await.unwrap();
    });

    c.bench_function("ledger/reserve_with_rollback", |b| {
        b.iter(|| {
            rt.block_on(async {
                assert!(ledger.reserve(&items).await.is_err());
            });
        });
    });
}

fn bench_contended_decrements(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    c.bench_function("ledger/contended_decrements_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryInventoryLedger::new();
                let unit = UnitRef::product("HOT");
                ledger.set_stock(&unit, 32).await.unwrap();

                let mut handles = Vec::with_capacity(64);
                for _ in 0..64 {
                    let ledger = ledger.clone();
                    let unit = unit.clone();
                    handles.push(tokio::spawn(async move {
                        ledger.decrement_if_available(&unit, 1).await
                    }));
                }
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_and_restore,
    bench_rejected_reservation,
    bench_contended_decrements
);
criterion_main!(benches);
