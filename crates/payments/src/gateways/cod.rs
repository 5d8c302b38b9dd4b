//! Cash on delivery.

use async_trait::async_trait;
use domain::GatewayId;

use crate::error::GatewayError;
use crate::gateway::{
    CallbackPayload, InitiateRequest, Initiation, PaymentGateway, PaymentMethodInfo,
    VerifiedPayment,
};

/// Manual gateway: the courier collects cash and an admin records it.
#[derive(Debug, Clone)]
pub struct CodGateway {
    enabled: bool,
}

impl CodGateway {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl PaymentGateway for CodGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Cod
    }

    fn info(&self) -> PaymentMethodInfo {
        PaymentMethodInfo {
            id: GatewayId::Cod,
            name: "Cash on delivery".to_string(),
            description: "Pay the courier in cash when the order arrives".to_string(),
            enabled: self.enabled,
        }
    }

    async fn initiate(&self, _request: &InitiateRequest) -> Result<Initiation, GatewayError> {
        Ok(Initiation::manual(GatewayId::Cod))
    }

    async fn verify(&self, _payload: &CallbackPayload) -> Result<VerifiedPayment, GatewayError> {
        Err(GatewayError::verification(
            "cash on delivery has no callback, collection is recorded by an admin",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callbacks_are_always_rejected() {
        let cod = CodGateway::new(true);
        let err = cod
            .verify(&CallbackPayload::from_pairs([("status", "Completed")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::VerificationFailed(_)));
    }
}
