//! Admin order and payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::AggregateId;
use domain::OrderStatus;
use event_store::EventStore;
use serde::Deserialize;

use super::orders::{OrderResponse, parse_order_id, respond};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CodCollectedRequest {
    pub order_id: AggregateId,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: AggregateId,
    #[serde(default)]
    pub reason: Option<String>,
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip(state, caller, req), fields(status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .lifecycle
        .update_status(&caller.0, order_id, req.status, req.note)
        .await?;
    respond(&order)
}

/// POST /admin/payments/cod-collected
#[tracing::instrument(skip(state, caller, req), fields(order_id = %req.order_id))]
pub async fn cod_collected<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CodCollectedRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .payments
        .mark_cod_collected(&caller.0, req.order_id)
        .await?;
    respond(&order)
}

/// POST /admin/payments/refund
#[tracing::instrument(skip(state, caller, req), fields(order_id = %req.order_id))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .payments
        .refund_payment(&caller.0, req.order_id, req.reason)
        .await?;
    respond(&order)
}
