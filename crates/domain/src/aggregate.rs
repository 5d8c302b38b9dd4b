//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact that happened to an aggregate. Named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event name stored in the envelope's `event_type`.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced aggregate.
///
/// State is rebuilt by replaying events through [`Aggregate::apply`]; command
/// methods on the aggregate inspect state and return the events to append.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Stream family name, e.g. `"Order"`.
    fn aggregate_type() -> &'static str;

    /// Returns `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// Version of the last applied event (0 for a new aggregate).
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Applies an event. Must be deterministic and infallible: events are facts.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId },
        Incremented { by: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Incremented { .. } => "CounterIncremented",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<AggregateId>,
        value: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counter error")]
    struct CounterError;

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Opened { id } => self.id = Some(id),
                CounterEvent::Incremented { by } => self.value += by,
            }
        }
    }

    #[test]
    fn apply_events_in_order() {
        let id = AggregateId::new();
        let mut counter = Counter::default();
        counter.apply_events(vec![
            CounterEvent::Opened { id },
            CounterEvent::Incremented { by: 2 },
            CounterEvent::Incremented { by: 3 },
        ]);

        assert_eq!(counter.id(), Some(id));
        assert_eq!(counter.value, 5);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            CounterEvent::Opened {
                id: AggregateId::new()
            }
            .event_type(),
            "CounterOpened"
        );
        assert_eq!(
            CounterEvent::Incremented { by: 1 }.event_type(),
            "CounterIncremented"
        );
    }
}
