//! Value objects for the order domain.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, Money, ProductId, UnitRef, VariantId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// A purchased line, priced at the moment the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_subtotal: Money,
}

impl LineItem {
    pub fn new(
        product_id: ProductId,
        variant_id: Option<VariantId>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            variant_id,
            name: name.into(),
            unit_price,
            quantity,
            line_subtotal: unit_price.multiply(quantity),
        }
    }

    /// The stock unit this line draws from.
    pub fn unit(&self) -> UnitRef {
        UnitRef::for_item(&self.product_id, self.variant_id.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub note: Option<String>,
    /// User id of the actor, or `"system"`.
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// Human-facing order number, `ORD-<YYYYMMDD>-<32 hex>`.
///
/// The hex part is the whole order id, so two orders share a number only if
/// they share an id, which the event store refuses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Derives the number from the order id and placement date.
    pub fn generate(order_id: AggregateId, date: NaiveDate) -> Self {
        let hex = order_id.as_uuid().simple().to_string().to_uppercase();
        Self(format!("ORD-{}-{hex}", date.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
