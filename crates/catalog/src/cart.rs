//! Shopping carts.
//!
//! A cart holds references and quantities only. Prices are resolved against
//! the live catalog at checkout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, variant_id: Option<VariantId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
            quantity,
        }
    }

    fn same_line(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        &self.product_id == product_id && self.variant_id.as_ref() == variant_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get(&self, user: UserId) -> Result<Cart, CatalogError>;

    /// Adds to an existing line for the same product and variant, or appends one.
    async fn add_item(&self, user: UserId, item: CartItem) -> Result<Cart, CatalogError>;

    /// Removes every line of the product, or only the given variant's line.
    async fn remove_item(
        &self,
        user: UserId,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Cart, CatalogError>;

    async fn clear(&self, user: UserId) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<Mutex<HashMap<UserId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn carts(&self) -> MutexGuard<'_, HashMap<UserId, Cart>> {
        self.carts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user: UserId) -> Result<Cart, CatalogError> {
        Ok(self.carts().get(&user).cloned().unwrap_or_default())
    }

    async fn add_item(&self, user: UserId, item: CartItem) -> Result<Cart, CatalogError> {
        if item.quantity == 0 {
            return Err(CatalogError::InvalidQuantity);
        }

        let mut carts = self.carts();
        let cart = carts.entry(user).or_default();
        match cart
            .items
            .iter_mut()
            .find(|line| line.same_line(&item.product_id, item.variant_id.as_ref()))
        {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => cart.items.push(item),
        }
        Ok(cart.clone())
    }

    async fn remove_item(
        &self,
        user: UserId,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Cart, CatalogError> {
        let mut carts = self.carts();
        let cart = carts.entry(user).or_default();
        cart.items.retain(|line| match variant_id {
            Some(_) => !line.same_line(product_id, variant_id),
            None => &line.product_id != product_id,
        });
        Ok(cart.clone())
    }

    async fn clear(&self, user: UserId) -> Result<(), CatalogError> {
        self.carts().remove(&user);
        Ok(())
    }
}
