//! The caller's shopping cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use catalog::{Cart, CartItem};
use common::{ProductId, VariantId};
use event_store::EventStore;
use serde::Deserialize;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RemoveItemQuery {
    #[serde(default)]
    pub variant_id: Option<VariantId>,
}

/// GET /cart
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.carts().get(caller.0.user_id).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, caller, item), fields(product_id = %item.product_id, quantity = item.quantity))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(item): Json<CartItem>,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.carts().add_item(caller.0.user_id, item).await?))
}

/// DELETE /cart/items/{product_id}?variant_id=
pub async fn remove_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(product_id): Path<String>,
    Query(query): Query<RemoveItemQuery>,
) -> Result<Json<Cart>, ApiError> {
    let product_id = ProductId::from(product_id);
    let cart = state
        .carts()
        .remove_item(caller.0.user_id, &product_id, query.variant_id.as_ref())
        .await?;
    Ok(Json(cart))
}
