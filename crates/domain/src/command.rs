//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::Serialize;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events this call appended. Empty when the command was a no-op.
    pub events: Vec<A::Event>,

    pub new_version: Version,

    /// Number of times the command was re-decided after losing a race.
    pub retries: u32,
}

impl<A: Aggregate> CommandResult<A> {
    /// True if this call appended anything.
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

/// An intention to change one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Loads aggregates, runs command functions against them and appends the
/// resulting events with an expected-version check.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays an aggregate's stream. Unknown ids yield a default aggregate.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning `None` if it has never been created.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Runs the command once; a lost race surfaces as a conflict error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        actor: &str,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnMut(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_with_retry(aggregate_id, actor, 0, command_fn)
            .await
    }

    /// Runs the command, reloading and re-deciding up to `max_retries` times
    /// when another writer appended first.
    ///
    /// The command function sees fresh state on every attempt, so a decision
    /// that was legal against the stale state is re-validated.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        actor: &str,
        max_retries: u32,
        mut command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnMut(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut retries = 0;
        loop {
            match self.try_execute(aggregate_id, actor, &mut command_fn).await {
                Ok(mut result) => {
                    result.retries = retries;
                    return Ok(result);
                }
                Err(e) if e.is_conflict() && retries < max_retries => {
                    retries += 1;
                    metrics::counter!("command_conflict_retries_total", "aggregate" => A::aggregate_type())
                        .increment(1);
                    tracing::debug!(%aggregate_id, retries, "append conflict, re-deciding");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_execute<F>(
        &self,
        aggregate_id: AggregateId,
        actor: &str,
        command_fn: &mut F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnMut(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
                retries: 0,
            });
        }

        let envelopes = self.build_envelopes(aggregate_id, current_version, actor, &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::expect_version(current_version))
            .await?;

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
            retries: 0,
        })
    }

    fn build_envelopes(
        &self,
        aggregate_id: AggregateId,
        current_version: Version,
        actor: &str,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError>
    where
        A::Event: Serialize,
    {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .metadata("actor", serde_json::Value::String(actor.to_string()))
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }
}
