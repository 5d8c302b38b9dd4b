//! Customer notifications after fulfilment transitions.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{AggregateId, UserId};
use domain::OrderStatus;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotification {
    pub user_id: UserId,
    pub order_id: AggregateId,
    pub order_number: String,
    pub status: OrderStatus,
}

impl StatusNotification {
    /// Statuses the customer hears about.
    pub fn is_notifiable(status: OrderStatus) -> bool {
        matches!(
            status,
            OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
        )
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel owned by another service (email, SMS, push).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &StatusNotification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %n.user_id,
            order_id = %n.order_id,
            order_number = %n.order_number,
            status = %n.status,
            "order status notification"
        );
        Ok(())
    }
}

/// Keeps notifications in memory so tests can inspect them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<StatusNotification>>>,
    fail: Arc<Mutex<bool>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<StatusNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes every following delivery fail.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, n: &StatusNotification) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(NotifyError("channel unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(n.clone());
        Ok(())
    }
}

/// Sends without waiting. Failures are logged and never reach the caller.
pub(crate) fn dispatch(notifier: Arc<dyn Notifier>, notification: StatusNotification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                order_id = %notification.order_id,
                status = %notification.status,
                error = %e,
                "order notification failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(status: OrderStatus) -> StatusNotification {
        StatusNotification {
            user_id: UserId::new(),
            order_id: AggregateId::new(),
            order_number: "ORD-20260101-ABCDEF01".to_string(),
            status,
        }
    }

    #[test]
    fn only_fulfilment_statuses_notify() {
        assert!(!StatusNotification::is_notifiable(OrderStatus::Pending));
        assert!(!StatusNotification::is_notifiable(OrderStatus::Confirmed));
        assert!(StatusNotification::is_notifiable(OrderStatus::Shipped));
        assert!(StatusNotification::is_notifiable(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn failing_channel_records_nothing() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail(true);
        assert!(notifier.notify(&notification(OrderStatus::Shipped)).await.is_err());
        assert!(notifier.sent().is_empty());

        notifier.set_fail(false);
        notifier.notify(&notification(OrderStatus::Shipped)).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }
}
