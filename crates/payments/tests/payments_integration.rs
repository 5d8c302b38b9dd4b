//! Payment flows from initiation to reconciliation, with stubbed providers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use catalog::{
    CartItem, CartStore, InMemoryCartStore, InMemoryCatalog, InMemoryInventoryLedger,
    InventoryLedger, ProductRecord,
};
use checkout::{Actor, CreateOrderRequest, OrderLifecycle};
use common::{AggregateId, Money, ProductId, UnitRef, UserId};
use domain::{Aggregate, GatewayId, OrderError, OrderStatus, PaymentStatus};
use event_store::InMemoryEventStore;
use payments::gateways::{
    EsewaGateway, EsewaStatus, EsewaStatusApi, EsewaStatusQuery, KhaltiApi, KhaltiGateway,
    KhaltiInitiateRequest, KhaltiInitiateResponse, KhaltiLookup,
};
use payments::{
    CallbackPayload, EsewaConfig, GatewayError, GatewayRegistry, GatewaysConfig, KhaltiConfig,
    PayerInfo, PaymentError, PaymentsService,
};

const PIDX: &str = "bZQLD9wRVWo4CdESSfuSsB";

/// Khalti sandbox stand-in: lookups report the amount that was initiated.
#[derive(Default)]
struct StubKhalti {
    amount: Mutex<i64>,
    status: Mutex<String>,
}

#[async_trait]
impl KhaltiApi for StubKhalti {
    async fn initiate(
        &self,
        request: &KhaltiInitiateRequest,
    ) -> Result<KhaltiInitiateResponse, GatewayError> {
        *self.amount.lock().unwrap() = request.amount;
        Ok(KhaltiInitiateResponse {
            pidx: PIDX.to_string(),
            payment_url: format!("https://test-pay.khalti.com/?pidx={PIDX}"),
            expires_at: None,
            expires_in: Some(1800),
        })
    }

    async fn lookup(&self, pidx: &str) -> Result<KhaltiLookup, GatewayError> {
        Ok(KhaltiLookup {
            pidx: pidx.to_string(),
            total_amount: *self.amount.lock().unwrap(),
            status: self.status.lock().unwrap().clone(),
            transaction_id: Some("7NNj2Wcwn8cfzqcrqGTgDV".to_string()),
            fee: Some(0),
            refunded: Some(false),
        })
    }
}

/// eSewa status API that always answers with one status.
struct StubEsewaStatus(&'static str);

#[async_trait]
impl EsewaStatusApi for StubEsewaStatus {
    async fn status(&self, query: &EsewaStatusQuery) -> Result<EsewaStatus, GatewayError> {
        Ok(EsewaStatus {
            product_code: Some(query.product_code.clone()),
            transaction_uuid: Some(query.transaction_uuid.clone()),
            total_amount: Some(serde_json::json!(query.total_amount)),
            status: self.0.to_string(),
            ref_id: None,
        })
    }
}

struct Fixture {
    payments: PaymentsService<InMemoryEventStore>,
    lifecycle: Arc<OrderLifecycle<InMemoryEventStore>>,
    carts: Arc<InMemoryCartStore>,
    ledger: Arc<InMemoryInventoryLedger>,
    khalti: Arc<StubKhalti>,
    esewa: Arc<EsewaGateway>,
}

fn singing_bowl() -> UnitRef {
    UnitRef::product("SINGING-BOWL")
}

async fn fixture(esewa_status: &'static str) -> Fixture {
    let catalog = InMemoryCatalog::new();
    catalog.upsert(ProductRecord {
        id: ProductId::new("SINGING-BOWL"),
        name: "Singing bowl".to_string(),
        price: Money::from_major(4_500),
        active: true,
        variants: vec![],
    });
    let ledger = Arc::new(InMemoryInventoryLedger::new());
    ledger.set_stock(&singing_bowl(), 10).await.unwrap();
    let carts = Arc::new(InMemoryCartStore::new());

    let lifecycle = Arc::new(OrderLifecycle::new(
        InMemoryEventStore::new(),
        Arc::new(catalog),
        carts.clone(),
        ledger.clone(),
    ));

    let config = GatewaysConfig::default();
    let khalti = Arc::new(StubKhalti::default());
    let esewa_config = EsewaConfig {
        enabled: true,
        secret_key: "test-esewa-secret".to_string(),
        ..EsewaConfig::default()
    };
    let esewa = Arc::new(EsewaGateway::new(
        esewa_config,
        Arc::new(StubEsewaStatus(esewa_status)),
    ));
    let khalti_config = KhaltiConfig {
        enabled: true,
        secret_key: "test-secret".to_string(),
        ..KhaltiConfig::default()
    };
    let registry = GatewayRegistry::from_config(&config)
        .unwrap()
        .register(esewa.clone())
        .register(Arc::new(KhaltiGateway::new(khalti_config, khalti.clone())));

    Fixture {
        payments: PaymentsService::new(lifecycle.clone(), registry, config),
        lifecycle,
        carts,
        ledger,
        khalti,
        esewa,
    }
}

impl Fixture {
    async fn order(&self, customer: &Actor, method: GatewayId) -> AggregateId {
        self.carts
            .add_item(customer.user_id, CartItem::new("SINGING-BOWL", None, 1))
            .await
            .unwrap();
        self.lifecycle
            .create_order(
                customer,
                CreateOrderRequest {
                    payment_method: method,
                    shipping_address: None,
                },
            )
            .await
            .unwrap()
            .id()
            .unwrap()
    }

    fn khalti_callback(&self, order_id: AggregateId, attempt: u32, claimed: &str) -> CallbackPayload {
        CallbackPayload::from_pairs([
            ("pidx", PIDX.to_string()),
            ("purchase_order_id", format!("{}-{attempt}", order_id.as_uuid().simple())),
            ("status", claimed.to_string()),
        ])
    }

    /// A success redirect signed the way eSewa signs it.
    fn esewa_success(&self, transaction_uuid: &str, total_amount: &str) -> CallbackPayload {
        let names = "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
        let message = format!(
            "transaction_code=000AWEO,status=COMPLETE,total_amount={total_amount},transaction_uuid={transaction_uuid},product_code=EPAYTEST,signed_field_names={names}"
        );
        let body = serde_json::json!({
            "transaction_code": "000AWEO",
            "status": "COMPLETE",
            "total_amount": total_amount,
            "transaction_uuid": transaction_uuid,
            "product_code": "EPAYTEST",
            "signed_field_names": names,
            "signature": self.esewa.sign(&message).unwrap(),
        });
        CallbackPayload::from_pairs([("data", STANDARD.encode(body.to_string()))])
    }
}

#[tokio::test]
async fn cash_on_delivery_collection_keeps_the_state_machine() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    let id = f.order(&customer, GatewayId::Cod).await;

    let session = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Cod, PayerInfo::default())
        .await
        .unwrap();
    assert!(session.initiation.manual);
    assert_eq!(session.status, PaymentStatus::Pending);
    assert!(session.initiation.redirect_url.is_none());

    let order = f.payments.mark_cod_collected(&admin, id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment().unwrap().status, PaymentStatus::Completed);

    let err = f
        .lifecycle
        .update_status(&admin, id, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_order_error(),
        Some(OrderError::IllegalTransition {
            current: OrderStatus::Pending,
            requested: OrderStatus::Delivered,
        })
    ));
    assert_eq!(
        err.to_string(),
        "cannot transition order from pending to delivered"
    );

    let order = f
        .lifecycle
        .update_status(&admin, id, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
}

#[tokio::test]
async fn only_admins_mark_cash_collected() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Cod).await;

    let err = f.payments.mark_cod_collected(&customer, id).await.unwrap_err();
    assert!(matches!(err, PaymentError::Unauthorized(_)));
}

#[tokio::test]
async fn khalti_failure_after_capture_changes_nothing() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Khalti).await;

    let session = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap();
    assert_eq!(session.attempt, 1);
    assert_eq!(session.initiation.gateway_reference.as_deref(), Some(PIDX));

    *f.khalti.status.lock().unwrap() = "Completed".to_string();
    let outcome = f
        .payments
        .handle_callback(GatewayId::Khalti, f.khalti_callback(id, 1, "Completed"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.order_id, id);

    *f.khalti.status.lock().unwrap() = "Expired".to_string();
    let outcome = f
        .payments
        .handle_callback(GatewayId::Khalti, f.khalti_callback(id, 1, "Expired"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message, "payment already confirmed");

    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    let attempt = order.payment_attempt(1).unwrap();
    assert_eq!(attempt.status, PaymentStatus::Completed);
    assert_eq!(attempt.transaction_id.as_deref(), Some("7NNj2Wcwn8cfzqcrqGTgDV"));
}

#[tokio::test]
async fn duplicate_callbacks_confirm_once() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Khalti).await;
    f.payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap();
    *f.khalti.status.lock().unwrap() = "Completed".to_string();

    for _ in 0..3 {
        let outcome = f
            .payments
            .handle_callback(GatewayId::Khalti, f.khalti_callback(id, 1, "Completed"))
            .await
            .unwrap();
        assert!(outcome.success);
    }

    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    let confirmations = order
        .status_history()
        .iter()
        .filter(|e| e.status == OrderStatus::Confirmed)
        .count();
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn pending_khalti_lookup_is_not_final() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Khalti).await;
    f.payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap();
    *f.khalti.status.lock().unwrap() = "Pending".to_string();

    // The query claims success; the lookup does not.
    let err = f
        .payments
        .handle_callback(GatewayId::Khalti, f.khalti_callback(id, 1, "Completed"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Gateway(GatewayError::VerificationFailed(_))
    ));

    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(!order.is_paid());
}

#[tokio::test]
async fn esewa_signed_success_confirms_the_order() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Esewa).await;

    let session = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Esewa, PayerInfo::default())
        .await
        .unwrap();
    let fields = session.initiation.form_fields.clone().unwrap();
    let uuid = fields["transaction_uuid"].clone();
    let total = fields["total_amount"].clone();
    // 4500 + 100 shipping + 13% tax
    assert_eq!(total, "5185.00");
    assert_eq!(fields["product_code"], "EPAYTEST");

    let outcome = f
        .payments
        .verify_payment(&customer, id, GatewayId::Esewa, f.esewa_success(&uuid, &total))
        .await
        .unwrap();
    assert!(outcome.success);

    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.payment().unwrap().transaction_id.as_deref(), Some("000AWEO"));
}

#[tokio::test]
async fn esewa_failure_redirect_is_checked_with_the_status_api() {
    let f = fixture("CANCELED").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Esewa).await;
    let session = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Esewa, PayerInfo::default())
        .await
        .unwrap();
    let fields = session.initiation.form_fields.unwrap();

    let outcome = f
        .payments
        .handle_callback(
            GatewayId::Esewa,
            CallbackPayload::from_pairs([
                ("transaction_uuid", fields["transaction_uuid"].clone()),
                ("total_amount", fields["total_amount"].clone()),
            ]),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_attempt(1).unwrap().status, PaymentStatus::Failed);

    // A new attempt can be started after a failure.
    let retry = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Esewa, PayerInfo::default())
        .await
        .unwrap();
    assert_eq!(retry.attempt, 2);
}

#[tokio::test]
async fn esewa_failure_redirect_with_a_wrong_amount_keeps_the_attempt_open() {
    let f = fixture("NOT_FOUND").await;
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Esewa).await;
    let session = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Esewa, PayerInfo::default())
        .await
        .unwrap();
    let fields = session.initiation.form_fields.unwrap();

    let err = f
        .payments
        .handle_callback(
            GatewayId::Esewa,
            CallbackPayload::from_pairs([
                ("transaction_uuid", fields["transaction_uuid"].clone()),
                ("total_amount", "1.00".to_string()),
            ]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PaymentError::Gateway(GatewayError::VerificationFailed(_))
    ));
    let order = f.lifecycle.orders().get_order(id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_attempt(1).unwrap().status, PaymentStatus::Initiated);
}

#[tokio::test]
async fn verification_is_bound_to_the_callers_order() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let stranger = Actor::customer(UserId::new());
    let mine = f.order(&customer, GatewayId::Esewa).await;
    let other = f.order(&customer, GatewayId::Esewa).await;

    let session = f
        .payments
        .initiate_payment(&customer, other, GatewayId::Esewa, PayerInfo::default())
        .await
        .unwrap();
    let fields = session.initiation.form_fields.unwrap();
    let payload = f.esewa_success(&fields["transaction_uuid"], &fields["total_amount"]);

    let err = f
        .payments
        .verify_payment(&customer, mine, GatewayId::Esewa, payload.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ReferenceMismatch { .. }));

    let err = f
        .payments
        .verify_payment(&stranger, other, GatewayId::Esewa, payload)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Unauthorized(_)));
}

#[tokio::test]
async fn paid_or_foreign_orders_cannot_be_paid_again() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    let id = f.order(&customer, GatewayId::Cod).await;

    let err = f
        .payments
        .initiate_payment(&Actor::customer(UserId::new()), id, GatewayId::Cod, PayerInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Unauthorized(_)));

    f.payments.mark_cod_collected(&admin, id).await.unwrap();
    let err = f
        .payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err.as_order_error(), Some(OrderError::AlreadyPaid)));
}

#[tokio::test]
async fn disabled_gateways_are_refused() {
    let f = fixture("COMPLETE").await;
    let config = GatewaysConfig::default();
    let payments = PaymentsService::new(
        f.lifecycle.clone(),
        GatewayRegistry::from_config(&config).unwrap(),
        config,
    );
    let customer = Actor::customer(UserId::new());
    let id = f.order(&customer, GatewayId::Cod).await;

    let err = payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::GatewayDisabled(GatewayId::Khalti)));
    assert!(
        payments
            .available_methods()
            .iter()
            .all(|m| m.id != GatewayId::Khalti)
    );
}

#[tokio::test]
async fn refund_cancels_and_restocks_an_unshipped_order() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    let id = f.order(&customer, GatewayId::Khalti).await;
    assert_eq!(f.ledger.stock(&singing_bowl()).await.unwrap(), Some(9));

    f.payments
        .initiate_payment(&customer, id, GatewayId::Khalti, PayerInfo::default())
        .await
        .unwrap();
    *f.khalti.status.lock().unwrap() = "Completed".to_string();
    f.payments
        .handle_callback(GatewayId::Khalti, f.khalti_callback(id, 1, "Completed"))
        .await
        .unwrap();

    let order = f
        .payments
        .refund_payment(&admin, id, Some("customer changed their mind".into()))
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.payment_attempt(1).unwrap().status, PaymentStatus::Refunded);
    assert!(!order.is_paid());
    assert_eq!(f.ledger.stock(&singing_bowl()).await.unwrap(), Some(10));

    let err = f.payments.refund_payment(&admin, id, None).await.unwrap_err();
    assert!(matches!(err.as_order_error(), Some(OrderError::NothingToRefund)));
}

#[tokio::test]
async fn shipped_orders_are_not_refunded() {
    let f = fixture("COMPLETE").await;
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    let id = f.order(&customer, GatewayId::Cod).await;
    f.payments.mark_cod_collected(&admin, id).await.unwrap();
    for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
        f.lifecycle.update_status(&admin, id, status, None).await.unwrap();
    }

    let err = f.payments.refund_payment(&admin, id, None).await.unwrap_err();
    assert!(matches!(
        err.as_order_error(),
        Some(OrderError::RefundNotAllowed {
            status: OrderStatus::Shipped
        })
    ));
}
