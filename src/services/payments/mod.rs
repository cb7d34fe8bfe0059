pub mod paypal;

use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;

pub use paypal::PayPalClient;

/// A payment order created on the gateway side.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    /// The gateway's id for the order, echoed back at capture time.
    pub id: String,
    /// Buyer-facing approval URL, when the gateway hands one out.
    pub approve_url: Option<String>,
}

/// Result of capturing a previously approved gateway order.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub status: String,
}

impl CaptureOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// External payment processor seam. One implementation today (PayPal); the
/// checkout flow only sees this trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway-side order for the given amount. `reference` is our
    /// order number, carried through for reconciliation.
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Captures funds for an approved gateway order.
    async fn capture_order(&self, gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError>;
}
