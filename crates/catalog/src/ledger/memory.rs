use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::UnitRef;

use super::{Decrement, InventoryLedger};
use crate::error::LedgerError;

/// In-memory ledger.
///
/// Each primitive runs its check and its write inside one short critical
/// section; the lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    stock: Arc<Mutex<HashMap<UnitRef, u32>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total units across all counters.
    pub fn total_units(&self) -> u64 {
        self.counters().values().map(|&v| u64::from(v)).sum()
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<UnitRef, u32>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock still guards valid data.
        self.stock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn decrement_if_available(
        &self,
        unit: &UnitRef,
        quantity: u32,
    ) -> Result<Decrement, LedgerError> {
        let mut counters = self.counters();
        let current = counters
            .get_mut(unit)
            .ok_or_else(|| LedgerError::UnknownUnit(unit.clone()))?;

        if *current < quantity {
            return Ok(Decrement::Insufficient {
                available: *current,
            });
        }
        *current -= quantity;
        Ok(Decrement::Applied {
            remaining: *current,
        })
    }

    async fn increment(&self, unit: &UnitRef, quantity: u32) -> Result<u32, LedgerError> {
        let mut counters = self.counters();
        let current = counters
            .get_mut(unit)
            .ok_or_else(|| LedgerError::UnknownUnit(unit.clone()))?;
        *current = current.saturating_add(quantity);
        Ok(*current)
    }

    async fn stock(&self, unit: &UnitRef) -> Result<Option<u32>, LedgerError> {
        Ok(self.counters().get(unit).copied())
    }

    async fn set_stock(&self, unit: &UnitRef, stock: u32) -> Result<(), LedgerError> {
        self.counters().insert(unit.clone(), stock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_applies_when_available() {
        let ledger = InMemoryInventoryLedger::new();
        let unit = UnitRef::product("A");
        ledger.set_stock(&unit, 2).await.unwrap();

        assert_eq!(
            ledger.decrement_if_available(&unit, 2).await.unwrap(),
            Decrement::Applied { remaining: 0 }
        );
        assert_eq!(
            ledger.decrement_if_available(&unit, 1).await.unwrap(),
            Decrement::Insufficient { available: 0 }
        );
        assert_eq!(ledger.stock(&unit).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn unknown_units_error() {
        let ledger = InMemoryInventoryLedger::new();
        let unit = UnitRef::product("missing");

        assert!(matches!(
            ledger.decrement_if_available(&unit, 1).await,
            Err(LedgerError::UnknownUnit(_))
        ));
        assert!(ledger.increment(&unit, 1).await.is_err());
        assert_eq!(ledger.stock(&unit).await.unwrap(), None);
    }

    #[tokio::test]
    async fn increment_returns_new_count() {
        let ledger = InMemoryInventoryLedger::new();
        let unit = UnitRef::variant("A", "s");
        ledger.set_stock(&unit, 1).await.unwrap();

        assert_eq!(ledger.increment(&unit, 4).await.unwrap(), 5);
        assert_eq!(ledger.total_units(), 5);
    }
}
