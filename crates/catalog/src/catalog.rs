//! Product catalog lookups.
//!
//! The catalog itself is owned by another service; this crate only needs to
//! resolve a product (and its variants) to a name, a current price and an
//! active flag.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId, UnitRef, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, LedgerError};
use crate::ledger::InventoryLedger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub id: VariantId,
    pub label: String,
    /// Overrides the product price when set.
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

fn default_active() -> bool {
    true
}

impl ProductRecord {
    pub fn variant(&self, id: &VariantId) -> Option<&VariantRecord> {
        self.variants.iter().find(|v| &v.id == id)
    }

    /// Current price of the product or one of its variants.
    pub fn price_for(&self, variant: Option<&VariantRecord>) -> Money {
        variant.and_then(|v| v.price).unwrap_or(self.price)
    }

    /// Display name of a line, e.g. `Pashmina shawl (Maroon)`.
    pub fn display_name(&self, variant: Option<&VariantRecord>) -> String {
        match variant {
            Some(v) => format!("{} ({})", self.name, v.label),
            None => self.name.clone(),
        }
    }
}

/// Read access to the live catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: &ProductId) -> Result<Option<ProductRecord>, CatalogError>;
}

/// Stock count attached to a seeded unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedStock {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub stock: u32,
}

impl SeedStock {
    pub fn unit(&self) -> UnitRef {
        UnitRef::for_item(&self.product_id, self.variant_id.as_ref())
    }
}

/// JSON document used to seed the in-memory catalog and the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub stock: Vec<SeedStock>,
}

const DEMO_SEED: &str = include_str!("../data/demo_catalog.json");

impl CatalogSeed {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Small built-in catalog for local runs.
    pub fn demo() -> Result<Self, CatalogError> {
        Self::from_json(DEMO_SEED)
    }

    /// Writes every seeded stock count into the ledger.
    pub async fn apply_stock<L>(&self, ledger: &L) -> Result<(), LedgerError>
    where
        L: InventoryLedger + ?Sized,
    {
        for entry in &self.stock {
            ledger.set_stock(&entry.unit(), entry.stock).await?;
        }
        tracing::info!(units = self.stock.len(), "inventory seeded");
        Ok(())
    }

    /// Seeds only units the ledger has no record of, leaving live counts
    /// of a persistent ledger untouched across restarts.
    pub async fn apply_missing_stock<L>(&self, ledger: &L) -> Result<usize, LedgerError>
    where
        L: InventoryLedger + ?Sized,
    {
        let mut seeded = 0;
        for entry in &self.stock {
            let unit = entry.unit();
            if ledger.stock(&unit).await?.is_none() {
                ledger.set_stock(&unit, entry.stock).await?;
                seeded += 1;
            }
        }
        tracing::info!(seeded, known = self.stock.len() - seeded, "inventory seeded");
        Ok(seeded)
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductRecord>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &CatalogSeed) -> Self {
        let catalog = Self::new();
        for product in &seed.products {
            catalog.upsert(product.clone());
        }
        catalog
    }

    pub fn upsert(&self, product: ProductRecord) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.id.clone(), product);
    }

    /// Marks a product inactive, as the catalog service does on delete.
    pub fn deactivate(&self, id: &ProductId) {
        if let Some(product) = self
            .products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            product.active = false;
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: &ProductId) -> Result<Option<ProductRecord>, CatalogError> {
        Ok(self
            .products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}
