use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout core. Consumed in-process by
/// `process_events`; notification fan-out hangs off that loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
    },
    OrderPaid {
        order_id: Uuid,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    CartLineRemoved {
        user_id: Uuid,
        product_id: Uuid,
        reason: String,
    },
    CartLineClamped {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    WalletDebited {
        user_id: Uuid,
        amount: Decimal,
        order_id: Uuid,
    },
    PaypalOrderCreated {
        order_id: Uuid,
        paypal_order_id: String,
    },
    PaypalCaptureFailed {
        order_id: Uuid,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the processing loop is gone.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing. Used where event delivery
    /// must never abort the surrounding operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Event processing loop. Today this only logs; order-placed and wallet
/// notifications hook in here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                order_number,
                user_id,
            } => {
                info!(%order_id, %order_number, %user_id, "order placed");
            }
            Event::OrderPaid { order_id } => {
                info!(%order_id, "order paid");
            }
            Event::OrderCancelled { order_id, reason } => {
                info!(%order_id, reason, "order cancelled");
            }
            Event::WalletDebited {
                user_id,
                amount,
                order_id,
            } => {
                info!(%user_id, %amount, %order_id, "wallet debited");
            }
            Event::PaypalCaptureFailed { order_id, message } => {
                warn!(%order_id, message, "paypal capture failed");
            }
            other => {
                info!(event = ?other, "event");
            }
        }
    }

    info!("Event processing loop stopped");
}
