//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::{CatalogError, LedgerError};
use checkout::CheckoutError;
use domain::{DomainError, OrderError};
use event_store::EventStoreError;
use payments::{GatewayError, PaymentError, ReconcileError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// No usable caller identity.
    Unauthenticated(String),
    NotFound(String),
    Checkout(CheckoutError),
    Payment(PaymentError),
    Catalog(CatalogError),
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "internal server error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Checkout(err) => checkout_error_to_response(&err),
            ApiError::Payment(err) => payment_error_to_response(&err),
            ApiError::Catalog(err) => catalog_error_to_response(&err),
            ApiError::Internal(msg) => internal(&msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Logs the detail and answers with a generic message.
fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
}

fn checkout_error_to_response(err: &CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidQuantity(_)
        | CheckoutError::PaymentMethodUnavailable(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::VariantInvalid { .. } | CheckoutError::ProductUnavailable(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::Unauthorized(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CheckoutError::Ledger(ledger) => ledger_error_to_response(ledger),
        CheckoutError::Catalog(catalog) => catalog_error_to_response(catalog),
        CheckoutError::Domain(domain) => domain_error_to_response(domain),
        CheckoutError::Projection(_) => internal(err),
    }
}

fn ledger_error_to_response(err: &LedgerError) -> (StatusCode, String) {
    match err {
        LedgerError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        LedgerError::UnknownUnit(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        LedgerError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        LedgerError::Database(_) => internal(err),
    }
}

fn catalog_error_to_response(err: &CatalogError) -> (StatusCode, String) {
    match err {
        CatalogError::InvalidQuantity => (StatusCode::BAD_REQUEST, err.to_string()),
        CatalogError::Unavailable(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        CatalogError::InvalidSeed(_) | CatalogError::Io(_) => internal(err),
    }
}

fn order_error_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotCreated | OrderError::PaymentNotFound { .. } => StatusCode::NOT_FOUND,
        OrderError::NoItems => StatusCode::BAD_REQUEST,
        OrderError::AlreadyCreated
        | OrderError::IllegalTransition { .. }
        | OrderError::OrderNotPayable { .. }
        | OrderError::AlreadyPaid
        | OrderError::StaleAttempt { .. }
        | OrderError::AlreadyReconciled { .. }
        | OrderError::NothingToRefund
        | OrderError::RefundNotAllowed { .. }
        | OrderError::NotCancelled { .. } => StatusCode::CONFLICT,
        OrderError::GatewayMismatch { .. }
        | OrderError::AmountMismatch { .. }
        | OrderError::NotCashOnDelivery => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn domain_error_to_response(err: &DomainError) -> (StatusCode, String) {
    match err {
        DomainError::Order(order_err) => (order_error_status(order_err), err.to_string()),
        DomainError::AggregateNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => (
            StatusCode::CONFLICT,
            "the order was changed concurrently, please retry".to_string(),
        ),
        _ => internal(err),
    }
}

fn gateway_error_to_response(err: &GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::Disabled(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        GatewayError::VerificationFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        GatewayError::Provider { status, .. } => {
            tracing::warn!(status, error = %err, "payment provider error");
            (
                StatusCode::BAD_GATEWAY,
                "payment provider returned an error".to_string(),
            )
        }
        GatewayError::Http(_) => {
            tracing::warn!(error = %err, "payment provider unreachable");
            (
                StatusCode::BAD_GATEWAY,
                "payment provider is unreachable".to_string(),
            )
        }
        GatewayError::Config(_) => internal(err),
    }
}

fn payment_error_to_response(err: &PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PaymentError::GatewayDisabled(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        PaymentError::Unauthorized(_) => (StatusCode::FORBIDDEN, err.to_string()),
        PaymentError::ReferenceMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        PaymentError::Gateway(gateway) => gateway_error_to_response(gateway),
        PaymentError::Reconcile(reconcile) => match reconcile {
            ReconcileError::OrderNotFound(_) | ReconcileError::PaymentNotFound { .. } => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            ReconcileError::AlreadyReconciled { .. } => (StatusCode::CONFLICT, err.to_string()),
            ReconcileError::AmountMismatch { .. } | ReconcileError::GatewayMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ReconcileError::Domain(domain) => domain_error_to_response(domain),
        },
        PaymentError::Checkout(checkout) => checkout_error_to_response(checkout),
        PaymentError::Domain(domain) => domain_error_to_response(domain),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}
