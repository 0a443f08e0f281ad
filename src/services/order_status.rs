use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Administrator-driven order status transitions.
///
/// The graph is strictly forward-only; cancellation is reachable from the
/// first three states only, and the rejected-payment state is written by
/// payment reconciliation, never through here. Writes are guarded with a
/// compare-and-swap on the order's `version` column so two racing updates
/// cannot smuggle in an illegal transition.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies an admin-requested status change.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        actor: Actor,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only administrators may change order status".to_string(),
            ));
        }

        let db = &*self.db;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                warn!(order_id = %order_id, "Order not found for status update");
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })?;

        let current = parse_status(&order.status)?;

        // Requesting the current status is always an allowed no-op; skip the
        // write entirely so the version does not churn.
        if current == new_status {
            return Ok(order);
        }

        if !is_valid_transition(current, new_status) {
            error!(
                order_id = %order_id,
                from = %current,
                to = %new_status,
                "Illegal status transition requested"
            );
            return Err(ServiceError::IllegalTransition(format!(
                "Cannot transition from '{}' to '{}'",
                current, new_status
            )));
        }

        // Compare-and-swap on the version read above; a concurrent writer
        // makes this touch zero rows.
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(order::Column::Version, Expr::value(order.version + 1))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} was modified concurrently; re-read and retry",
                order_id
            )));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} disappeared during update", order_id))
            })?;

        info!(
            order_id = %order_id,
            old_status = %current,
            new_status = %new_status,
            "Order status updated"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: new_status.to_string(),
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to send status changed event");
        }

        Ok(updated)
    }

    /// Gets the current status of an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        parse_status(&order.status)
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("Unknown order status '{}'", raw)))
}

/// The admin transition table. Self-transitions are handled by the caller
/// as no-ops and are not listed here.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match (from, to) {
        (AwaitingPayment, PaymentConfirmed) => true,
        (AwaitingPayment, Cancelled) => true,

        (PaymentConfirmed, Processing) => true,
        (PaymentConfirmed, Cancelled) => true,

        (Processing, Shipped) => true,
        (Processing, Cancelled) => true,

        (Shipped, Completed) => true,

        // Completed, Cancelled, and PaymentRejected are terminal
        _ => false,
    }
}
