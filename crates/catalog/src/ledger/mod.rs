//! Inventory ledger: per-unit stock counters that are never oversold.

mod memory;
mod postgres;

pub use memory::InMemoryInventoryLedger;
pub use postgres::PostgresInventoryLedger;

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::UnitRef;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Outcome of a conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    Applied { remaining: u32 },
    Insufficient { available: u32 },
}

/// A quantity to take from (or give back to) one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub unit: UnitRef,
    pub quantity: u32,
}

impl ReservationItem {
    pub fn new(unit: UnitRef, quantity: u32) -> Self {
        Self { unit, quantity }
    }
}

/// Stock storage primitives.
///
/// `decrement_if_available` is a single conditional update: it either takes
/// the full quantity or leaves the counter untouched. Stock can never go
/// below zero.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn decrement_if_available(
        &self,
        unit: &UnitRef,
        quantity: u32,
    ) -> Result<Decrement, LedgerError>;

    /// Adds stock back and returns the new count.
    async fn increment(&self, unit: &UnitRef, quantity: u32) -> Result<u32, LedgerError>;

    /// Current count, for display and tests. Never use it to decide a decrement.
    async fn stock(&self, unit: &UnitRef) -> Result<Option<u32>, LedgerError>;

    /// Overwrites the counter. Seeding and catalog sync only.
    async fn set_stock(&self, unit: &UnitRef, stock: u32) -> Result<(), LedgerError>;
}

/// Batch operations built on the ledger primitives.
#[async_trait]
pub trait InventoryLedgerExt: InventoryLedger {
    /// Reserves every item or none.
    ///
    /// Quantities for the same unit are merged first. If any unit is short,
    /// units already taken by this batch are given back before the error is
    /// returned.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[ReservationItem]) -> Result<(), LedgerError> {
        let merged = merge(items)?;
        let mut taken: Vec<(&UnitRef, u32)> = Vec::with_capacity(merged.len());

        for (unit, &quantity) in &merged {
            let outcome = match self.decrement_if_available(unit, quantity).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.roll_back(&taken).await;
                    return Err(e);
                }
            };

            match outcome {
                Decrement::Applied { remaining } => {
                    tracing::debug!(%unit, quantity, remaining, "stock reserved");
                    taken.push((unit, quantity));
                }
                Decrement::Insufficient { available } => {
                    self.roll_back(&taken).await;
                    metrics::counter!("inventory_reservations_failed_total").increment(1);
                    return Err(LedgerError::InsufficientStock {
                        unit: unit.clone(),
                        requested: quantity,
                        available,
                    });
                }
            }
        }

        Ok(())
    }

    /// Gives stock back. The caller guarantees this runs at most once per
    /// reservation. Every unit is attempted; the first error is returned.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn restore(&self, items: &[ReservationItem]) -> Result<(), LedgerError> {
        let merged = merge(items)?;
        let mut first_error = None;

        for (unit, &quantity) in &merged {
            if let Err(e) = self.increment(unit, quantity).await {
                metrics::counter!("inventory_restore_failures_total").increment(1);
                tracing::error!(%unit, quantity, error = %e, "stock restore failed, manual reconciliation required");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn roll_back(&self, taken: &[(&UnitRef, u32)]) {
        for (unit, quantity) in taken {
            if let Err(e) = self.increment(unit, *quantity).await {
                metrics::counter!("inventory_restore_failures_total").increment(1);
                tracing::error!(%unit, quantity, error = %e, "reservation rollback failed, manual reconciliation required");
            }
        }
    }
}

impl<T: InventoryLedger + ?Sized> InventoryLedgerExt for T {}

fn merge(items: &[ReservationItem]) -> Result<BTreeMap<UnitRef, u32>, LedgerError> {
    let mut merged: BTreeMap<UnitRef, u32> = BTreeMap::new();
    for item in items {
        if item.quantity == 0 {
            return Err(LedgerError::InvalidQuantity {
                unit: item.unit.clone(),
                quantity: item.quantity,
            });
        }
        let entry = merged.entry(item.unit.clone()).or_insert(0);
        *entry = entry.saturating_add(item.quantity);
    }
    Ok(merged)
}
