use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Result of a payment capture attempt, applied back onto the order by the
/// checkout orchestrator.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
}

/// External payment gateway seam.
///
/// The orchestrator depends only on this shape; gateway internals (Stripe,
/// bKash, Nagad) live behind it and are out of scope here.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Provider identifier recorded on orders ("demo", "stripe", ...).
    fn provider(&self) -> &str;

    /// Captures payment for an order.
    async fn process_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        method: &str,
    ) -> Result<PaymentOutcome, ServiceError>;

    /// Issues a refund against a previously captured payment.
    async fn create_refund(&self, order_id: Uuid, amount: Decimal) -> Result<(), ServiceError>;
}

/// Demo gateway: approves every capture and refund.
#[derive(Debug, Default, Clone)]
pub struct DemoPaymentProcessor;

#[async_trait]
impl PaymentProcessor for DemoPaymentProcessor {
    fn provider(&self) -> &str {
        "demo"
    }

    async fn process_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
        method: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        info!(%order_id, %amount, method, "processing demo payment");
        Ok(PaymentOutcome {
            success: true,
            transaction_id: Some(format!("demo_{}", Uuid::new_v4().simple())),
            message: "Payment captured".to_string(),
        })
    }

    async fn create_refund(&self, order_id: Uuid, amount: Decimal) -> Result<(), ServiceError> {
        info!(%order_id, %amount, "issuing demo refund");
        Ok(())
    }
}

/// Placeholder for gateways that are recognized but not wired up in this
/// deployment. Every call fails with an external-service error.
#[derive(Debug, Clone)]
pub struct UnconfiguredProcessor {
    provider: String,
}

#[async_trait]
impl PaymentProcessor for UnconfiguredProcessor {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn process_payment(
        &self,
        _order_id: Uuid,
        _amount: Decimal,
        _method: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        Err(ServiceError::ExternalServiceError(format!(
            "Payment provider {} is not configured",
            self.provider
        )))
    }

    async fn create_refund(&self, _order_id: Uuid, _amount: Decimal) -> Result<(), ServiceError> {
        Err(ServiceError::ExternalServiceError(format!(
            "Payment provider {} is not configured",
            self.provider
        )))
    }
}

/// Selects the processor for the configured provider name.
pub fn processor_for(provider: &str) -> Arc<dyn PaymentProcessor> {
    match provider {
        "demo" => Arc::new(DemoPaymentProcessor),
        other => Arc::new(UnconfiguredProcessor {
            provider: other.to_string(),
        }),
    }
}
