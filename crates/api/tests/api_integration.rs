//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::AppConfig;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use catalog::{
    CatalogSeed, InMemoryCartStore, InMemoryCatalog, InMemoryInventoryLedger, InventoryLedger,
};
use common::{UnitRef, UserId};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            api::telemetry::install_metrics_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    ledger: Arc<InMemoryInventoryLedger>,
}

async fn setup() -> TestApp {
    let seed = CatalogSeed::demo().unwrap();
    let ledger = Arc::new(InMemoryInventoryLedger::new());
    seed.apply_stock(ledger.as_ref()).await.unwrap();

    let mut config = AppConfig::default();
    config.esewa.enabled = true;
    config.esewa.secret_key = "test-esewa-secret".to_string();

    let state = AppState::new(
        &config,
        InMemoryEventStore::new(),
        Arc::new(InMemoryCatalog::from_seed(&seed)),
        Arc::new(InMemoryCartStore::new()),
        ledger.clone(),
    )
    .unwrap();

    TestApp {
        app: api::create_app(Arc::new(state), get_metrics_handle()),
        ledger,
    }
}

enum Who {
    Anonymous,
    Customer(UserId),
    Admin,
}

fn request(method: &str, uri: &str, who: &Who, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        Who::Anonymous => {}
        Who::Customer(id) => builder = builder.header("x-user-id", id.to_string()),
        Who::Admin => {
            builder = builder
                .header("x-user-id", UserId::new().to_string())
                .header("x-user-role", "admin");
        }
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Fills the customer's cart and checks out with cash on delivery.
async fn place_order(app: &axum::Router, customer: &Who, quantity: u32) -> Value {
    let (status, _) = send(
        app,
        request(
            "POST",
            "/cart/items",
            customer,
            Some(json!({ "product_id": "SINGING-BOWL", "quantity": quantity })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = send(
        app,
        request(
            "POST",
            "/orders",
            customer,
            Some(json!({
                "payment_method": "cod",
                "shipping_address": {
                    "full_name": "Sita Sharma",
                    "phone": "9800000000",
                    "line1": "Jhamsikhel",
                    "city": "Lalitpur"
                }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let (status, json) = send(&t.app, request("GET", "/health", &Who::Anonymous, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].as_str().is_some());
    assert_eq!(json["views"]["UserOrdersView"], 0);
    assert_eq!(json["views"]["PendingOrdersView"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    place_order(&t.app, &customer, 1).await;

    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/metrics", &Who::Anonymous, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}

#[tokio::test]
async fn test_requests_without_identity_are_rejected() {
    let t = setup().await;

    let (status, json) = send(&t.app, request("GET", "/orders", &Who::Anonymous, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "missing user identity");

    let bad = Request::builder()
        .uri("/cart")
        .header("x-user-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cart_endpoints() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());

    for variant in ["m", "l", "m"] {
        let (status, _) = send(
            &t.app,
            request(
                "POST",
                "/cart/items",
                &customer,
                Some(json!({ "product_id": "DHAKA-TOPI", "variant_id": variant, "quantity": 1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, cart) = send(&t.app, request("GET", "/cart", &customer, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);

    let (status, cart) = send(
        &t.app,
        request("DELETE", "/cart/items/DHAKA-TOPI?variant_id=m", &customer, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["variant_id"], "l");

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/cart/items",
            &customer,
            Some(json!({ "product_id": "ILAM-TEA", "quantity": 0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_prices_and_reserves_stock() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());

    let order = place_order(&t.app, &customer, 2).await;

    assert_eq!(order["status"], "pending");
    assert!(order["order_number"].as_str().is_some());
    // 2 x 3200.00, free shipping over 5000.00, 13% tax
    assert_eq!(order["pricing"]["subtotal"], 640_000);
    assert_eq!(order["pricing"]["shipping_cost"], 0);
    assert_eq!(order["pricing"]["total"], 723_200);
    assert_eq!(order["can_be_cancelled"], true);
    assert_eq!(
        t.ledger
            .stock(&UnitRef::product("SINGING-BOWL"))
            .await
            .unwrap(),
        Some(1)
    );

    let (_, cart) = send(&t.app, request("GET", "/cart", &customer, None)).await;
    assert!(cart["items"].as_array().unwrap().is_empty());

    let (status, list) = send(&t.app, request("GET", "/orders", &customer, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["order_id"], order["id"]);
}

#[tokio::test]
async fn test_insufficient_stock_is_a_conflict() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());

    send(
        &t.app,
        request(
            "POST",
            "/cart/items",
            &customer,
            Some(json!({ "product_id": "SINGING-BOWL", "quantity": 4 })),
        ),
    )
    .await;
    let (status, json) = send(
        &t.app,
        request("POST", "/orders", &customer, Some(json!({ "payment_method": "cod" }))),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .starts_with("insufficient stock")
    );
    assert_eq!(
        t.ledger
            .stock(&UnitRef::product("SINGING-BOWL"))
            .await
            .unwrap(),
        Some(3)
    );
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());

    let (status, _) = send(
        &t.app,
        request("POST", "/orders", &customer, Some(json!({ "payment_method": "cod" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let t = setup().await;
    let owner = Who::Customer(UserId::new());
    let order = place_order(&t.app, &owner, 1).await;
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = send(&t.app, request("GET", &uri, &owner, None)).await;
    assert_eq!(status, StatusCode::OK);

    let stranger = Who::Customer(UserId::new());
    let (status, _) = send(&t.app, request("GET", &uri, &stranger, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, request("GET", &uri, &Who::Admin, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, request("GET", "/orders/not-an-id", &owner, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_status_updates() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    let order = place_order(&t.app, &customer, 1).await;
    let uri = format!("/admin/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = send(
        &t.app,
        request("PUT", &uri, &customer, Some(json!({ "status": "confirmed" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &t.app,
        request("PUT", &uri, &Who::Admin, Some(json!({ "status": "delivered" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        json["error"],
        "cannot transition order from pending to delivered"
    );

    let (status, json) = send(
        &t.app,
        request(
            "PUT",
            &uri,
            &Who::Admin,
            Some(json!({ "status": "confirmed", "note": "phone verified" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["status_history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_restocks() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    let order = place_order(&t.app, &customer, 2).await;
    let uri = format!("/orders/{}/cancel", order["id"].as_str().unwrap());

    let (status, json) = send(
        &t.app,
        request("POST", &uri, &customer, Some(json!({ "reason": "ordered twice" }))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(json["cancellation_reason"], "ordered twice");
    assert_eq!(json["can_be_cancelled"], false);
    assert_eq!(
        t.ledger
            .stock(&UnitRef::product("SINGING-BOWL"))
            .await
            .unwrap(),
        Some(3)
    );
}

#[tokio::test]
async fn test_payment_methods() {
    let t = setup().await;

    let (status, json) = send(
        &t.app,
        request("GET", "/payments/methods", &Who::Anonymous, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["cod", "esewa"]);
}

#[tokio::test]
async fn test_cash_on_delivery_payment() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    let order = place_order(&t.app, &customer, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, session) = send(
        &t.app,
        request(
            "POST",
            "/payments/initiate",
            &customer,
            Some(json!({ "order_id": order_id, "gateway": "cod" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{session}");
    assert_eq!(session["manual"], true);
    assert_eq!(session["status"], "pending");
    assert_eq!(session["attempt"], 1);

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/admin/payments/cod-collected",
            &customer,
            Some(json!({ "order_id": order_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/admin/payments/cod-collected",
            &Who::Admin,
            Some(json!({ "order_id": order_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["payment"]["status"], "completed");
    assert!(json["payments"][0].get("gateway_response").is_none());

    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/payments/initiate",
            &customer,
            Some(json!({ "order_id": order_id, "gateway": "cod" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{json}");
}

#[tokio::test]
async fn test_disabled_gateway_is_refused() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    let order = place_order(&t.app, &customer, 1).await;

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/payments/initiate",
            &customer,
            Some(json!({ "order_id": order["id"], "gateway": "khalti" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unverifiable_callback_redirects_to_failure_page() {
    let t = setup().await;

    let response = t
        .app
        .clone()
        .oneshot(request(
            "GET",
            "/payments/esewa/callback?data=bm90LWpzb24",
            &Who::Anonymous,
            None,
        ))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(
        location,
        "http://localhost:5173/payment/failure?reason=payment+could+not+be+verified"
    );
}

#[tokio::test]
async fn test_unknown_gateway_callback_is_not_found() {
    let t = setup().await;

    let (status, _) = send(
        &t.app,
        request("GET", "/payments/paypal/callback", &Who::Anonymous, None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refund_requires_a_completed_payment() {
    let t = setup().await;
    let customer = Who::Customer(UserId::new());
    let order = place_order(&t.app, &customer, 1).await;

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/admin/payments/refund",
            &Who::Admin,
            Some(json!({ "order_id": order["id"] })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}
