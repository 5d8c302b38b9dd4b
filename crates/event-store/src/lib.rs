//! Append-only event store.
//!
//! Every order is a stream of events keyed by its aggregate id. Appends carry the
//! version the writer decided at; a mismatch is rejected with
//! [`EventStoreError::ConcurrencyConflict`], which is what linearizes concurrent
//! writers on the same order.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
