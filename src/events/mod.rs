use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the cart, checkout and order services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),
    CartMerged {
        guest_cart_id: Uuid,
        user_cart_id: Uuid,
    },

    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        grand_total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderRefunded {
        order_id: Uuid,
        amount: Decimal,
    },

    // Payment events
    PaymentCaptured {
        order_id: Uuid,
        transaction_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },

    // Stock events
    StockReserved {
        product_id: Uuid,
        quantity: i32,
    },
    StockRestored {
        product_id: Uuid,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging delivery failures instead of surfacing them.
    ///
    /// Event delivery is best-effort: a full or closed channel must never
    /// fail the primary operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Builds an event channel with the configured capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Spawned at startup;
/// downstream consumers (webhooks, analytics) would hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "event processed");
    }
    info!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(8);
        let cart_id = Uuid::new_v4();
        sender.send(Event::CartCreated(cart_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::CartCreated(id)) => assert_eq!(id, cart_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        // Must not panic or error out
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
