//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::CreateOrderRequest;
use common::{AggregateId, Money, UserId};
use domain::{
    Aggregate, GatewayId, LineItem, Order, OrderStatus, PaymentAttempt, PaymentStatus,
    PaymentSummary, Pricing, ShippingAddress, StatusEntry,
};
use event_store::EventStore;
use projections::OrderSummary;
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: AggregateId,
    pub order_number: Option<String>,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub pricing: Option<Pricing>,
    pub payment: Option<PaymentSummary>,
    pub payments: Vec<PaymentAttemptResponse>,
    pub status_history: Vec<StatusEntry>,
    pub shipping_address: Option<ShippingAddress>,
    pub can_be_cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// A payment attempt without the provider's raw payloads.
#[derive(Debug, Serialize)]
pub struct PaymentAttemptResponse {
    pub attempt: u32,
    pub gateway: GatewayId,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub reference_id: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&PaymentAttempt> for PaymentAttemptResponse {
    fn from(p: &PaymentAttempt) -> Self {
        Self {
            attempt: p.attempt,
            gateway: p.gateway,
            amount: p.amount,
            currency: p.currency.clone(),
            status: p.status,
            transaction_id: p.transaction_id.clone(),
            reference_id: p.reference_id.clone(),
            initiated_at: p.initiated_at,
            paid_at: p.paid_at,
        }
    }
}

impl TryFrom<&Order> for OrderResponse {
    type Error = ApiError;

    fn try_from(order: &Order) -> Result<Self, Self::Error> {
        let id = order
            .id()
            .ok_or_else(|| ApiError::Internal("order without an id".to_string()))?;
        Ok(Self {
            id,
            order_number: order.order_number().map(|n| n.as_str().to_string()),
            user_id: order.user_id(),
            status: order.status(),
            items: order.items().to_vec(),
            pricing: order.pricing().copied(),
            payment: order.payment(),
            payments: order.payments().iter().map(Into::into).collect(),
            status_history: order.status_history().to_vec(),
            shipping_address: order.shipping_address().cloned(),
            can_be_cancelled: order.can_be_cancelled(),
            cancellation_reason: order.cancellation_reason().map(str::to_string),
            created_at: order.created_at(),
            cancelled_at: order.cancelled_at(),
            delivered_at: order.delivered_at(),
        })
    }
}

pub(crate) fn respond(order: &Order) -> Result<Json<OrderResponse>, ApiError> {
    OrderResponse::try_from(order).map(Json)
}

pub(crate) fn parse_order_id(id: &str) -> Result<AggregateId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order id: {id}")))
}

// -- Handlers --

/// POST /orders
///
/// Check out the caller's cart.
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.0.user_id))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.lifecycle.create_order(&caller.0, req).await?;
    Ok((StatusCode::CREATED, respond(&order)?))
}

/// GET /orders
///
/// The caller's orders; admins see all of them.
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    Ok(Json(state.lifecycle.list_orders(&caller.0).await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.get_order(&caller.0, order_id).await?;
    respond(&order)
}

/// POST /orders/{id}/cancel
///
/// Owner cancellation while pending or confirmed.
#[tracing::instrument(skip(state, caller, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .lifecycle
        .cancel_order(&caller.0, order_id, req.reason)
        .await?;
    respond(&order)
}
