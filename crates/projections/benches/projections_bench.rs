use common::{AggregateId, Money, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    ChangeStatus, GatewayId, LineItem, OrderService, OrderStatus, PlaceOrder, PricingPolicy,
};
use event_store::InMemoryEventStore;
use projections::{PendingOrdersView, Projection, ProjectionProcessor, UserOrdersView};

fn place(user_id: UserId) -> PlaceOrder {
    let items = vec![LineItem::new(
        ProductId::new("ILAM-TEA"),
        None,
        "Ilam tea 500g",
        Money::from_minor(45_000),
        2,
    )];
    PlaceOrder {
        order_id: AggregateId::new(),
        user_id,
        pricing: PricingPolicy::default().price(&items),
        items,
        payment_method: GatewayId::Esewa,
        shipping_address: None,
        actor: user_id.to_string(),
    }
}

/// N orders across 10 users, every other one confirmed (2 events each).
async fn populate_store(store: &InMemoryEventStore, n: usize) -> Vec<UserId> {
    let service = OrderService::new(store.clone());
    let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();
    for i in 0..n {
        let cmd = place(users[i % users.len()]);
        let order_id = cmd.order_id;
        service.place_order(cmd).await.unwrap();
        if i % 2 == 0 {
            service
                .change_status(ChangeStatus::new(order_id, OrderStatus::Confirmed, "admin"))
                .await
                .unwrap();
        }
    }
    users
}

fn processor_with_views(
    store: &InMemoryEventStore,
) -> (ProjectionProcessor<InMemoryEventStore>, UserOrdersView) {
    let orders = UserOrdersView::new();
    let mut processor = ProjectionProcessor::new(store.clone());
    processor.register(Box::new(orders.clone()) as Box<dyn Projection>);
    processor.register(Box::new(PendingOrdersView::new()) as Box<dyn Projection>);
    (processor, orders)
}

fn bench_catch_up_100_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));

    c.bench_function("projections/catch_up_100_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (processor, _) = processor_with_views(&store);
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_idle_catch_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));
    let (processor, _) = processor_with_views(&store);
    rt.block_on(processor.run_catch_up()).unwrap();

    c.bench_function("projections/catch_up_nothing_new", |b| {
        b.iter(|| {
            rt.block_on(async {
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_orders_for_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let users = rt.block_on(populate_store(&store, 500));
    let (processor, orders) = processor_with_views(&store);
    rt.block_on(processor.run_catch_up()).unwrap();

    c.bench_function("projections/orders_for_user", |b| {
        b.iter(|| {
            rt.block_on(async {
                orders.orders_for(users[0]).await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_orders,
    bench_idle_catch_up,
    bench_orders_for_user,
);
criterion_main!(benches);
