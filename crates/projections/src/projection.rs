//! Projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Global store position up to which every event has been delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition(i64);

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn new(position: i64) -> Self {
        Self(position)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// True when `position` directly follows this one, leaving no hole.
    pub fn is_followed_by(&self, position: i64) -> bool {
        position == self.0 + 1
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.0)
    }
}

/// Turns stored events into a query-side view.
///
/// The same event may be handed over more than once; implementations drop
/// events whose stream version they have already applied.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event. Events of other aggregate types are ignored.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_without_holes() {
        let pos = ProjectionPosition::new(4);
        assert!(pos.is_followed_by(5));
        assert!(!pos.is_followed_by(6));
        assert!(ProjectionPosition::zero().is_followed_by(1));
        assert_eq!(pos.to_string(), "position(4)");
    }
}
