use common::UnitRef;
use thiserror::Error;

/// Errors raised by the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient stock for {unit}: requested {requested}, only {available} left")]
    InsufficientStock {
        unit: UnitRef,
        requested: u32,
        available: u32,
    },

    #[error("no stock record for {0}")]
    UnknownUnit(UnitRef),

    #[error("invalid quantity {quantity} for {unit}")]
    InvalidQuantity { unit: UnitRef, quantity: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by catalog and cart lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog seed is invalid: {0}")]
    InvalidSeed(#[from] serde_json::Error),

    #[error("catalog seed could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}
