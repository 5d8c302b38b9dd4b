//! Checkout error types.

use catalog::{CatalogError, LedgerError};
use common::{AggregateId, ProductId, VariantId};
use domain::{DomainError, GatewayId, OrderError};
use projections::ProjectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("variant {variant_id} of product {product_id} is not available")]
    VariantInvalid {
        product_id: ProductId,
        variant_id: VariantId,
    },

    #[error("product {0} is no longer available")]
    ProductUnavailable(ProductId),

    #[error("quantity for product {0} must be at least 1")]
    InvalidQuantity(ProductId),

    #[error("payment method {0} is not available")]
    PaymentMethodUnavailable(GatewayId),

    #[error("order {0} not found")]
    OrderNotFound(AggregateId),

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl CheckoutError {
    /// Maps an aggregate's "not created" rejection to a not-found error.
    pub(crate) fn from_domain(order_id: AggregateId, err: DomainError) -> Self {
        match err {
            DomainError::Order(OrderError::NotCreated) => CheckoutError::OrderNotFound(order_id),
            other => CheckoutError::Domain(other),
        }
    }

    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            CheckoutError::Domain(e) => e.as_order_error(),
            _ => None,
        }
    }

    /// Short label for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::VariantInvalid { .. } => "variant_invalid",
            CheckoutError::ProductUnavailable(_) => "product_unavailable",
            CheckoutError::InvalidQuantity(_) => "invalid_quantity",
            CheckoutError::PaymentMethodUnavailable(_) => "payment_method_unavailable",
            CheckoutError::Ledger(LedgerError::InsufficientStock { .. }) => "insufficient_stock",
            _ => "error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
