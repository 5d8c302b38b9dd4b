//! Feeds stored events to projections.

use chrono::{Duration, Utc};
use event_store::EventStore;
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::projection::{Projection, ProjectionPosition};
use crate::{ProjectionError, Result};

/// How long a hole in the global positions is waited on before it is
/// treated as a rolled-back append.
pub const DEFAULT_GAP_TIMEOUT_SECS: i64 = 30;

/// Delivers events from an event store to registered projections.
///
/// The checkpoint only moves over positions with no unfilled hole before
/// them. Events past a hole are still delivered, and delivered again on the
/// next catch-up until the hole fills or times out; views drop events whose
/// stream version they have already applied.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    checkpoint: Mutex<ProjectionPosition>,
    gap_timeout: Duration,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            checkpoint: Mutex::new(ProjectionPosition::zero()),
            gap_timeout: Duration::seconds(DEFAULT_GAP_TIMEOUT_SECS),
        }
    }

    pub fn with_gap_timeout(mut self, gap_timeout: Duration) -> Self {
        self.gap_timeout = gap_timeout;
        self
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Delivers events stored after the checkpoint to every projection.
    ///
    /// Catch-ups are serialized; a second caller waits and then reads only
    /// what the first did not settle.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let mut checkpoint = self.checkpoint.lock().await;
        let start = *checkpoint;
        let mut stream = self.store.stream_events_after(start.as_i64()).await?;
        let now = Utc::now();
        let mut settled = true;
        let mut delivered: u64 = 0;
        let mut held_back: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            let position = event
                .position
                .ok_or(ProjectionError::Unpositioned(event.event_id))?;

            for projection in &self.projections {
                projection.handle(&event).await?;
            }
            delivered += self.projections.len() as u64;

            if settled && !checkpoint.is_followed_by(position) {
                if now - event.timestamp >= self.gap_timeout {
                    tracing::warn!(
                        after = %checkpoint,
                        next = position,
                        "skipping store positions that never committed"
                    );
                } else {
                    settled = false;
                }
            }
            if settled {
                *checkpoint = ProjectionPosition::new(position);
            } else {
                held_back += 1;
            }
        }

        if delivered > 0 {
            metrics::counter!("projection_events_delivered_total").increment(delivered);
            tracing::debug!(
                from = %start,
                to = %checkpoint,
                delivered,
                held_back,
                "projections caught up"
            );
        }

        Ok(())
    }
}
