pub mod carts;
pub mod common;
pub mod invoices;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    carts::CartService,
    gateway::HttpPaymentGateway,
    invoicing::InvoicingService,
    mailer::{DisabledMailer, HttpMailer, Mailer},
    order_status::OrderStatusService,
    orders::OrderService,
    payments::PaymentService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub order: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub invoicing: Arc<InvoicingService>,
}

impl AppServices {
    /// Builds the service container, wiring the HTTP gateway and mailer
    /// clients from configuration.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let gateway = Arc::new(HttpPaymentGateway::new(
            config.gateway_base_url.clone(),
            config.gateway_server_key.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )?);

        let mailer: Arc<dyn Mailer> = match &config.mailer_endpoint {
            Some(endpoint) => Arc::new(HttpMailer::new(
                endpoint.clone(),
                config.mailer_from.clone(),
                Duration::from_secs(config.mailer_timeout_secs),
            )?),
            None => {
                info!("mail endpoint not configured; invoice email dispatch disabled");
                Arc::new(DisabledMailer)
            }
        };

        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let order = Arc::new(OrderService::new(db.clone(), Some(event_sender.clone())));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
        ));
        let invoicing = Arc::new(InvoicingService::new(db, mailer, event_sender));

        Ok(Self {
            cart,
            order,
            order_status,
            payments,
            invoicing,
        })
    }
}
