use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

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
}

/// Events emitted after durable writes. Consumers are best-effort; a failed
/// send is logged and never surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderPlaced {
        order_id: Uuid,
        order_detail_id: Uuid,
        invoice_id: Uuid,
    },
    OrderPlacementCompensated {
        order_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentInitiated {
        invoice_id: Uuid,
        order_id: Uuid,
    },
    PaymentReconciled {
        invoice_id: Uuid,
        order_id: Uuid,
        payment_status: String,
        order_status: String,
    },

    // Cart events
    CartUpdated(Uuid),
    CartCleared(Uuid),

    // Invoice events
    InvoiceEmailSent {
        order_id: Uuid,
        recipient: String,
    },
}

impl Event {
    fn kind(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderPlacementCompensated { .. } => "order_placement_compensated",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentInitiated { .. } => "payment_initiated",
            Event::PaymentReconciled { .. } => "payment_reconciled",
            Event::CartUpdated(_) => "cart_updated",
            Event::CartCleared(_) => "cart_cleared",
            Event::InvoiceEmailSent { .. } => "invoice_email_sent",
        }
    }
}

/// Drains the event channel, logging each event. Spawned once at startup;
/// runs until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(kind = event.kind(), payload = %payload, "event"),
            Err(e) => warn!(kind = event.kind(), error = %e, "failed to serialize event"),
        }
    }
    info!("event channel closed; processor stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender
            .send(Event::CartCleared(order_id))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::CartCleared(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::CartUpdated(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
