use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published by the storefront services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, variant_id: Uuid },
    CartItemUpdated { cart_id: Uuid, variant_id: Uuid },
    CartItemRemoved { cart_id: Uuid, variant_id: Uuid },
    CouponApplied { cart_id: Uuid, code: String },
    CouponRemoved { cart_id: Uuid },

    // Checkout events
    CheckoutStarted {
        cart_id: Uuid,
        gateway_order_id: String,
        amount: Decimal,
    },
    PaymentCaptured {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    PaymentRefunded {
        order_id: Uuid,
        amount: Decimal,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    ReturnRequested(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    StockDepleted { product_id: Uuid, variant_id: Uuid },

    // Coupon admin events
    CouponCreated(Uuid),
    CouponRedeemed { coupon_id: Uuid, order_id: Uuid },

    // Gateway webhook events
    WebhookReceived { event_type: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged, never fatal.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events and logs them. Spawned from `main`; tests may spawn
/// their own to keep the channel drained.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Domain event");
    }
}
