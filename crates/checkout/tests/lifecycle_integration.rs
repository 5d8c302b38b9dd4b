//! End-to-end checkout flows against in-memory stores.

use std::sync::Arc;

use catalog::{
    CartItem, CartStore, InMemoryCartStore, InMemoryCatalog, InMemoryInventoryLedger,
    InventoryLedger, LedgerError, ProductRecord, VariantRecord,
};
use checkout::{Actor, CheckoutError, CreateOrderRequest, OrderLifecycle};
use common::{Money, ProductId, UnitRef, UserId, VariantId};
use domain::{Aggregate, GatewayId, OrderError, OrderStatus};
use event_store::InMemoryEventStore;

struct Fixture {
    lifecycle: Arc<OrderLifecycle<InMemoryEventStore>>,
    carts: Arc<InMemoryCartStore>,
    ledger: Arc<InMemoryInventoryLedger>,
}

fn shawl() -> UnitRef {
    UnitRef::variant("PASHMINA", "maroon")
}

async fn fixture(stock: u32) -> Fixture {
    let catalog = InMemoryCatalog::new();
    catalog.upsert(ProductRecord {
        id: ProductId::new("PASHMINA"),
        name: "Pashmina shawl".to_string(),
        price: Money::from_major(4_500),
        active: true,
        variants: vec![VariantRecord {
            id: VariantId::new("maroon"),
            label: "Maroon".to_string(),
            price: None,
            active: true,
        }],
    });

    let ledger = Arc::new(InMemoryInventoryLedger::new());
    ledger.set_stock(&shawl(), stock).await.unwrap();
    let carts = Arc::new(InMemoryCartStore::new());

    let lifecycle = OrderLifecycle::new(
        InMemoryEventStore::new(),
        Arc::new(catalog),
        carts.clone(),
        ledger.clone(),
    );

    Fixture {
        lifecycle: Arc::new(lifecycle),
        carts,
        ledger,
    }
}

async fn fill_cart(carts: &InMemoryCartStore, user: UserId, quantity: u32) {
    carts
        .add_item(user, CartItem::new("PASHMINA", Some(VariantId::new("maroon")), quantity))
        .await
        .unwrap();
}

fn cod() -> CreateOrderRequest {
    CreateOrderRequest {
        payment_method: GatewayId::Cod,
        shipping_address: None,
    }
}

#[tokio::test]
async fn last_units_are_sold_once() {
    let f = fixture(2).await;
    let first = Actor::customer(UserId::new());
    fill_cart(&f.carts, first.user_id, 2).await;

    let order = f.lifecycle.create_order(&first, cod()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(0));

    let second = Actor::customer(UserId::new());
    fill_cart(&f.carts, second.user_id, 1).await;
    let err = f.lifecycle.create_order(&second, cod()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Ledger(LedgerError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        })
    ));
    assert_eq!(
        err.to_string(),
        "insufficient stock for variant maroon of product PASHMINA: requested 1, only 0 left"
    );
    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(0));
}

#[tokio::test]
async fn admin_cancel_of_confirmed_order_restores_stock() {
    let f = fixture(5).await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    fill_cart(&f.carts, customer.user_id, 3).await;

    let id = f.lifecycle.create_order(&customer, cod()).await.unwrap().id().unwrap();
    f.lifecycle
        .update_status(&admin, id, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(2));

    let order = f
        .lifecycle
        .update_status(&admin, id, OrderStatus::Cancelled, Some("out of courier range".into()))
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert!(order.cancelled_at().is_some());
    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let stock = 7;
    let per_order = 2;
    let buyers = 10;
    let f = fixture(stock).await;

    let mut handles = Vec::new();
    for _ in 0..buyers {
        let actor = Actor::customer(UserId::new());
        fill_cart(&f.carts, actor.user_id, per_order).await;
        let lifecycle = Arc::clone(&f.lifecycle);
        handles.push(tokio::spawn(async move {
            lifecycle.create_order(&actor, cod()).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CheckoutError::Ledger(LedgerError::InsufficientStock { .. })) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, stock / per_order);
    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(stock % per_order));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancellations_restock_once() {
    let f = fixture(4).await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    fill_cart(&f.carts, customer.user_id, 4).await;
    let id = f.lifecycle.create_order(&customer, cod()).await.unwrap().id().unwrap();

    let by_customer = {
        let lifecycle = Arc::clone(&f.lifecycle);
        tokio::spawn(async move { lifecycle.cancel_order(&customer, id, None).await })
    };
    let by_admin = {
        let lifecycle = Arc::clone(&f.lifecycle);
        tokio::spawn(async move {
            lifecycle
                .update_status(&admin, id, OrderStatus::Cancelled, None)
                .await
        })
    };

    let results = [by_customer.await.unwrap(), by_admin.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e.as_order_error(), Some(OrderError::IllegalTransition { .. }))
                    || matches!(e, CheckoutError::Domain(d) if d.is_conflict()),
                "unexpected error: {e}"
            );
        }
    }

    assert_eq!(f.ledger.stock(&shawl()).await.unwrap(), Some(4));
    let order = f.lifecycle.get_order(&admin, id).await.unwrap();
    assert!(order.stock_restored());
    let cancellations = order
        .status_history()
        .iter()
        .filter(|entry| entry.status == OrderStatus::Cancelled)
        .count();
    assert_eq!(cancellations, 1);
}

#[tokio::test]
async fn orders_keep_the_price_they_were_placed_at() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let product = ProductRecord {
        id: ProductId::new("PASHMINA"),
        name: "Pashmina shawl".to_string(),
        price: Money::from_major(4_500),
        active: true,
        variants: vec![],
    };
    catalog.upsert(product.clone());
    let ledger = Arc::new(InMemoryInventoryLedger::new());
    ledger.set_stock(&UnitRef::product("PASHMINA"), 3).await.unwrap();
    let carts = Arc::new(InMemoryCartStore::new());
    let lifecycle = OrderLifecycle::new(
        InMemoryEventStore::new(),
        catalog.clone(),
        carts.clone(),
        ledger,
    );

    let customer = Actor::customer(UserId::new());
    carts
        .add_item(customer.user_id, CartItem::new("PASHMINA", None, 1))
        .await
        .unwrap();
    let id = lifecycle.create_order(&customer, cod()).await.unwrap().id().unwrap();

    catalog.upsert(ProductRecord {
        price: Money::from_major(9_000),
        ..product
    });

    let order = lifecycle.get_order(&customer, id).await.unwrap();
    assert_eq!(order.items()[0].unit_price, Money::from_major(4_500));
    let pricing = order.pricing().unwrap();
    assert_eq!(
        pricing.total(),
        pricing.subtotal() + pricing.shipping_cost() + pricing.tax() - pricing.discount()
    );
}
