//! Projection error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload does not decode as the aggregate's event type.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Event {0} was read without a store position")]
    Unpositioned(event_store::EventId),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
