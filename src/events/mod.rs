//! Typed notification channel.
//!
//! Saga steps publish [`Event`]s over an mpsc channel instead of a global
//! UI event bus; a background consumer logs them. Sends are best-effort:
//! a full or closed channel never fails a checkout step.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        session_id: Uuid,
        user_id: Uuid,
    },
    ShippingQuoted {
        session_id: Uuid,
        fee: Decimal,
        fallback: bool,
    },
    VoucherApplied {
        session_id: Uuid,
        code: String,
        discount: Decimal,
    },
    VoucherRemoved {
        session_id: Uuid,
        code: String,
    },
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    OrderSubmissionFailed {
        session_id: Uuid,
        reason: String,
    },
    PaymentRedirectIssued {
        order_number: String,
    },
    PaymentSucceeded {
        order_number: String,
    },
    PaymentFailed {
        order_number: String,
    },
    OrderCancelled {
        order_number: String,
        reason: String,
    },
    CartCleared {
        cart_id: Uuid,
    },
    /// A user-facing toast. Suppressed at the emit site when the user has
    /// muted notifications.
    Notification {
        user_id: Uuid,
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

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of propagating a channel failure.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("{}", e);
        }
    }
}

/// Consumes events and logs them. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderSubmissionFailed { session_id, reason } => {
                warn!(%session_id, reason, "order submission failed");
            }
            Event::PaymentFailed { order_number } => {
                warn!(order_number, "payment failed");
            }
            _ => info!(?event, "event"),
        }
    }
    info!("event channel closed, consumer exiting");
}
