//! Freezes a cart into priced order lines.

use catalog::{Cart, Catalog};
use domain::LineItem;

use crate::error::{CheckoutError, Result};

/// Resolves every cart entry against the live catalog.
///
/// Products and variants must exist and be active. The current price is
/// copied into the line, with a variant price taking precedence over the
/// product price. Nothing is reserved here.
pub async fn snapshot(catalog: &dyn Catalog, cart: &Cart) -> Result<Vec<LineItem>> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut lines = Vec::with_capacity(cart.items.len());
    for entry in &cart.items {
        if entry.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(entry.product_id.clone()));
        }

        let product = catalog
            .product(&entry.product_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| CheckoutError::ProductUnavailable(entry.product_id.clone()))?;

        let variant = match &entry.variant_id {
            Some(variant_id) => Some(
                product
                    .variant(variant_id)
                    .filter(|v| v.active)
                    .ok_or_else(|| CheckoutError::VariantInvalid {
                        product_id: entry.product_id.clone(),
                        variant_id: variant_id.clone(),
                    })?,
            ),
            None => None,
        };

        lines.push(LineItem::new(
            product.id.clone(),
            entry.variant_id.clone(),
            product.display_name(variant),
            product.price_for(variant),
            entry.quantity,
        ));
    }

    Ok(lines)
}
