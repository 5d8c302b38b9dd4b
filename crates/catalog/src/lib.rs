//! Catalog lookups, shopping carts, and the inventory ledger.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod ledger;

pub use cart::{Cart, CartItem, CartStore, InMemoryCartStore};
pub use catalog::{Catalog, CatalogSeed, InMemoryCatalog, ProductRecord, SeedStock, VariantRecord};
pub use error::{CatalogError, LedgerError};
pub use ledger::{
    Decrement, InMemoryInventoryLedger, InventoryLedger, InventoryLedgerExt,
    PostgresInventoryLedger, ReservationItem,
};
