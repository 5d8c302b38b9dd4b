use async_trait::async_trait;
use common::UnitRef;
use sqlx::PgPool;

use super::{Decrement, InventoryLedger};
use crate::error::LedgerError;

/// PostgreSQL-backed ledger over the `inventory_units` table.
///
/// The decrement is one conditional `UPDATE`; the row lock it takes makes
/// concurrent decrements of the same unit serialize inside the database.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    async fn decrement_if_available(
        &self,
        unit: &UnitRef,
        quantity: u32,
    ) -> Result<Decrement, LedgerError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory_units
            SET stock = stock - $2, updated_at = NOW()
            WHERE unit_key = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(unit.key())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(Decrement::Applied {
                remaining: to_count(remaining),
            });
        }

        // Nothing updated: either the unit is unknown or it is short.
        match self.stock(unit).await? {
            Some(available) => Ok(Decrement::Insufficient { available }),
            None => Err(LedgerError::UnknownUnit(unit.clone())),
        }
    }

    async fn increment(&self, unit: &UnitRef, quantity: u32) -> Result<u32, LedgerError> {
        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory_units
            SET stock = stock + $2, updated_at = NOW()
            WHERE unit_key = $1
            RETURNING stock
            "#,
        )
        .bind(unit.key())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        stock
            .map(to_count)
            .ok_or_else(|| LedgerError::UnknownUnit(unit.clone()))
    }

    async fn stock(&self, unit: &UnitRef) -> Result<Option<u32>, LedgerError> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM inventory_units WHERE unit_key = $1")
                .bind(unit.key())
                .fetch_optional(&self.pool)
                .await?;
        Ok(stock.map(to_count))
    }

    async fn set_stock(&self, unit: &UnitRef, stock: u32) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_units (unit_key, stock)
            VALUES ($1, $2)
            ON CONFLICT (unit_key) DO UPDATE SET stock = EXCLUDED.stock, updated_at = NOW()
            "#,
        )
        .bind(unit.key())
        .bind(i64::from(stock))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
