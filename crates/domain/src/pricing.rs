//! Order pricing.

use common::Money;
use serde::{Deserialize, Serialize};

use crate::order::LineItem;

/// Price breakdown of an order.
///
/// Fields are private and the only constructor computes `total`, so
/// `total == subtotal + shipping_cost + tax - discount` holds for every value,
/// including ones read back from stored events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PricingRecord")]
pub struct Pricing {
    subtotal: Money,
    shipping_cost: Money,
    discount: Money,
    tax: Money,
    total: Money,
}

impl Pricing {
    pub fn new(subtotal: Money, shipping_cost: Money, discount: Money, tax: Money) -> Self {
        Self {
            subtotal,
            shipping_cost,
            discount,
            tax,
            total: subtotal + shipping_cost + tax - discount,
        }
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn total(&self) -> Money {
        self.total
    }
}

#[derive(Deserialize)]
struct PricingRecord {
    subtotal: Money,
    shipping_cost: Money,
    discount: Money,
    tax: Money,
    total: Money,
}

impl TryFrom<PricingRecord> for Pricing {
    type Error = String;

    fn try_from(record: PricingRecord) -> Result<Self, Self::Error> {
        let pricing = Pricing::new(
            record.subtotal,
            record.shipping_cost,
            record.discount,
            record.tax,
        );
        if pricing.total != record.total {
            return Err(format!(
                "pricing total {} does not match its components ({})",
                record.total, pricing.total
            ));
        }
        Ok(pricing)
    }
}

/// Shop pricing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Flat shipping fee per order.
    pub shipping_flat: Money,
    /// Orders with a subtotal at or above this ship free.
    pub free_shipping_threshold: Option<Money>,
    /// Tax rate in basis points, applied to `subtotal - discount`.
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_flat: Money::from_major(100),
            free_shipping_threshold: Some(Money::from_major(5_000)),
            tax_rate_bps: 1_300,
        }
    }
}

impl PricingPolicy {
    /// Prices a set of line items. Pure: same items, same result.
    pub fn price(&self, items: &[LineItem]) -> Pricing {
        let subtotal: Money = items.iter().map(|item| item.line_subtotal).sum();
        let discount = Money::zero();

        let shipping_cost = match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Money::zero(),
            _ if items.is_empty() => Money::zero(),
            _ => self.shipping_flat,
        };

        let tax = (subtotal - discount).apply_bps(self.tax_rate_bps);

        Pricing::new(subtotal, shipping_cost, discount, tax)
    }
}
