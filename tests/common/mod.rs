#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_api::{
    auth::{Actor, Role},
    db::{self, DbConfig, DbPool},
    entities::user,
    events::{self, EventSender},
    migrator::Migrator,
    services::gateway::{
        ChargeRequest, ChargeResponse, GatewayError, GatewayTransaction, GatewayTransactionState,
        PaymentGateway,
    },
    services::orders::{AddressInput, CheckoutItem, PlaceOrderRequest},
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness for spinning up service state backed by an in-memory
/// SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub event_sender: Arc<EventSender>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // A single pooled connection keeps the in-memory database alive for
        // the whole test.
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("failed to create test database");

        Migrator::up(&pool, None)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        Self {
            db: Arc::new(pool),
            event_sender,
            _event_task: event_task,
        }
    }

    /// Inserts a user row with an empty cart and returns its id.
    pub async fn create_user(&self, role: Role) -> Uuid {
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let model = user::ActiveModel {
            id: Set(user_id),
            name: Set("Siti Rahma".to_string()),
            email: Set(format!("user-{}@example.com", user_id)),
            phone: Set(Some("0812345678901".to_string())),
            role: Set(role.to_string()),
            cart: Set(serde_json::json!({})),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        model
            .insert(&*self.db)
            .await
            .expect("failed to create test user");

        user_id
    }

    pub fn customer_actor(&self, user_id: Uuid) -> Actor {
        Actor {
            id: user_id,
            role: Role::Customer,
        }
    }

    pub fn admin_actor(&self, user_id: Uuid) -> Actor {
        Actor {
            id: user_id,
            role: Role::Admin,
        }
    }
}

/// A valid checkout payload for tests.
pub fn checkout_request() -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: vec![CheckoutItem {
            product_id: Uuid::new_v4(),
            name: "Batik Shirt".to_string(),
            quantity: 2,
            unit_price: dec!(150000),
            line_total: dec!(300000),
            size: "M".to_string(),
            image_url: Some("https://cdn.example/batik.jpg".to_string()),
        }],
        shipping_address: AddressInput {
            street: "Jl. Melati 5".to_string(),
            province: "Jawa Barat".to_string(),
            regency: "Bandung".to_string(),
            district: "Coblong".to_string(),
            zipcode: "40132".to_string(),
        },
        recipient_name: "Siti Rahma".to_string(),
        recipient_phone: "0812345678901".to_string(),
        delivery_date: Utc::now() + Duration::days(5),
        shipping_cost: dec!(20000),
        amount: dec!(300000),
        total_amount: dec!(320000),
        total_weight: 600,
        note: None,
    }
}

/// Programmable in-process gateway double.
pub struct StubGateway {
    pub state: Mutex<GatewayTransactionState>,
    pub payment_type: Mutex<Option<String>>,
    pub status_calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(state: GatewayTransactionState) -> Self {
        Self {
            state: Mutex::new(state),
            payment_type: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: GatewayTransactionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_payment_type(&self, payment_type: Option<&str>) {
        *self.payment_type.lock().unwrap() = payment_type.map(str::to_owned);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_transaction(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        Ok(ChargeResponse {
            token: format!("tok-{}", request.reference),
            redirect_url: Some(format!("https://pay.example/{}", request.reference)),
        })
    }

    async fn fetch_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayTransaction {
            reference: reference.to_string(),
            state: *self.state.lock().unwrap(),
            payment_type: self.payment_type.lock().unwrap().clone(),
            settled_at: None,
        })
    }
}

/// Gateway double that has no record of any transaction.
pub struct MissingGateway;

#[async_trait]
impl PaymentGateway for MissingGateway {
    async fn create_transaction(
        &self,
        _request: &ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        Err(GatewayError::Unavailable("gateway is down".to_string()))
    }

    async fn fetch_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        Err(GatewayError::TransactionNotFound(format!(
            "no transaction under reference {}",
            reference
        )))
    }
}
