//! Payment endpoints: methods, initiation, provider callbacks, verification.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use common::AggregateId;
use domain::GatewayId;
use event_store::EventStore;
use payments::{
    CallbackOutcome, CallbackPayload, GatewayError, PayerInfo, PaymentError, PaymentMethodInfo,
    PaymentSession, ReconcileError,
};
use serde::Deserialize;
use url::Url;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: AggregateId,
    pub gateway: GatewayId,
    #[serde(default)]
    pub payer: PayerInfo,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: AggregateId,
    pub gateway: GatewayId,
    /// Parameters the provider handed to the client.
    pub data: CallbackPayload,
}

/// GET /payments/methods
pub async fn methods<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<PaymentMethodInfo>> {
    Json(state.payments.available_methods())
}

/// POST /payments/initiate
#[tracing::instrument(skip(state, caller, req), fields(order_id = %req.order_id, gateway = %req.gateway))]
pub async fn initiate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<Json<PaymentSession>, ApiError> {
    let session = state
        .payments
        .initiate_payment(&caller.0, req.order_id, req.gateway, req.payer)
        .await?;
    Ok(Json(session))
}

/// GET /payments/{gateway}/callback
///
/// Provider redirect back to the shop. Always answers with a redirect to
/// the storefront's success or failure page; failure reasons are short and
/// never echo the provider payload.
#[tracing::instrument(skip(state, params))]
pub async fn callback<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(gateway): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let gateway: GatewayId = gateway
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown payment gateway: {gateway}")))?;

    let redirect = match state
        .payments
        .handle_callback(gateway, CallbackPayload::new(params))
        .await
    {
        Ok(outcome) if outcome.success => frontend_redirect(
            &state.frontend_url,
            "payment/success",
            &[("order_id", outcome.order_id.to_string())],
        ),
        Ok(outcome) => frontend_redirect(
            &state.frontend_url,
            "payment/failure",
            &[
                ("order_id", outcome.order_id.to_string()),
                ("reason", outcome.message),
            ],
        ),
        Err(err) => {
            tracing::info!(%gateway, error = %err, "payment callback not applied");
            frontend_redirect(
                &state.frontend_url,
                "payment/failure",
                &[("reason", failure_reason(&err).to_string())],
            )
        }
    };
    Ok(redirect)
}

/// POST /payments/verify
///
/// Client-side confirmation by the order owner.
#[tracing::instrument(skip(state, caller, req), fields(order_id = %req.order_id, gateway = %req.gateway))]
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<CallbackOutcome>, ApiError> {
    let outcome = state
        .payments
        .verify_payment(&caller.0, req.order_id, req.gateway, req.data)
        .await?;
    Ok(Json(outcome))
}

fn failure_reason(err: &PaymentError) -> &'static str {
    match err {
        PaymentError::GatewayDisabled(_) => "payment method is not available",
        PaymentError::Gateway(GatewayError::VerificationFailed(_)) => {
            "payment could not be verified"
        }
        PaymentError::Gateway(GatewayError::Provider { .. } | GatewayError::Http(_)) => {
            "payment provider is unavailable, please try again"
        }
        PaymentError::OrderNotFound(_)
        | PaymentError::Reconcile(
            ReconcileError::OrderNotFound(_) | ReconcileError::PaymentNotFound { .. },
        ) => "order not found",
        PaymentError::Reconcile(
            ReconcileError::AmountMismatch { .. } | ReconcileError::GatewayMismatch { .. },
        ) => "payment details do not match the order",
        _ => "payment could not be processed",
    }
}

fn frontend_redirect(base: &str, path: &str, params: &[(&str, String)]) -> Redirect {
    let base = format!("{}/", base.trim_end_matches('/'));
    let target = Url::parse(&base).and_then(|base| base.join(path)).map(|mut url| {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        url.to_string()
    });
    match target {
        Ok(target) => Redirect::to(&target),
        Err(e) => {
            tracing::error!(error = %e, frontend_url = %base, "invalid frontend url");
            Redirect::to(&format!("/{path}"))
        }
    }
}
