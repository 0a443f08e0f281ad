use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::DbPool,
    entities::invoice::{self, Entity as InvoiceEntity, Model as InvoiceModel, PaymentStatus},
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_detail::{Entity as OrderDetailEntity, Model as OrderDetailModel},
    entities::user::Entity as UserEntity,
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{ChargeRequest, GatewayTransactionState, PaymentGateway},
    services::order_status::parse_status,
};

/// Builds the deterministic gateway reference for an invoice. Re-initiating
/// payment for the same invoice before settlement reproduces the same key,
/// so the gateway sees one transaction, not many.
pub fn gateway_reference(invoice_id: Uuid, invoice_created_at: DateTime<Utc>) -> String {
    format!("{}-{}", invoice_id, invoice_created_at.timestamp())
}

/// Maps the gateway's transaction state onto the local invoice and order
/// target states.
pub fn map_gateway_state(state: GatewayTransactionState) -> (PaymentStatus, OrderStatus) {
    match state {
        GatewayTransactionState::Capture | GatewayTransactionState::Settlement => {
            (PaymentStatus::Paid, OrderStatus::PaymentConfirmed)
        }
        GatewayTransactionState::Pending => (PaymentStatus::Pending, OrderStatus::AwaitingPayment),
        GatewayTransactionState::Deny
        | GatewayTransactionState::Cancel
        | GatewayTransactionState::Expire => (PaymentStatus::Failed, OrderStatus::PaymentRejected),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatePaymentResponse {
    /// Opaque token the storefront feeds into the gateway's checkout flow.
    pub token: String,
    pub redirect_url: Option<String>,
    pub invoice_id: Uuid,
    pub order_id: Uuid,
    /// Echo of the invoice creation timestamp; required later to rebuild
    /// the gateway reference for status polling.
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconcileResponse {
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub specific_payment_method: Option<String>,
}

/// Payment initiation against the external gateway, and pull-based
/// reconciliation of its authoritative transaction state into the local
/// invoice + order pair.
///
/// Reconciliation is deliberately pull-only: the webhook endpoint merely
/// acknowledges, and the client must ask this service to re-query the
/// gateway after completing the redirect flow.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Registers a gateway transaction for the invoice behind an order
    /// detail and returns the client token.
    ///
    /// Every link of the chain (detail → order, invoice, user) must exist;
    /// a hole means the placing saga was compensated underneath the caller.
    #[instrument(skip(self), fields(order_detail_id = %order_detail_id))]
    pub async fn initiate_payment(
        &self,
        actor: Actor,
        order_detail_id: Uuid,
    ) -> Result<InitiatePaymentResponse, ServiceError> {
        let db = &*self.db;

        let detail = OrderDetailEntity::find_by_id(order_detail_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order detail {} not found", order_detail_id))
            })?;

        let order = OrderEntity::find_by_id(detail.order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", detail.order_id))
            })?;

        if !actor.is_admin() && order.user_id != actor.id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another user".to_string(),
            ));
        }

        let invoice = InvoiceEntity::find()
            .filter(invoice::Column::OrderDetailId.eq(order_detail_id))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Invoice for order detail {} not found",
                    order_detail_id
                ))
            })?;

        let user = UserEntity::find_by_id(order.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", order.user_id)))?;

        let reference = gateway_reference(invoice.id, invoice.created_at);
        let charge = ChargeRequest {
            reference,
            gross_amount: order.total_amount,
            customer_name: user.name,
            customer_email: user.email,
            customer_phone: user.phone,
        };

        let charge_response = self
            .gateway
            .create_transaction(&charge)
            .await
            .map_err(ServiceError::from)?;

        info!(invoice_id = %invoice.id, order_id = %order.id, "Payment initiated");

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentInitiated {
                invoice_id: invoice.id,
                order_id: order.id,
            })
            .await
        {
            warn!(error = %e, invoice_id = %invoice.id, "Failed to send payment initiated event");
        }

        Ok(InitiatePaymentResponse {
            token: charge_response.token,
            redirect_url: charge_response.redirect_url,
            invoice_id: invoice.id,
            order_id: order.id,
            initiated_at: invoice.created_at,
        })
    }

    /// Pulls the authoritative gateway status and advances the invoice and
    /// order together.
    ///
    /// The write is idempotent: when the computed target equals the stored
    /// state nothing is written. The gateway-reported instrument is
    /// refreshed even when the status itself is unchanged.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, order_id = %order_id))]
    pub async fn check_status(
        &self,
        actor: Actor,
        invoice_id: Uuid,
        order_id: Uuid,
        initiated_at: DateTime<Utc>,
    ) -> Result<ReconcileResponse, ServiceError> {
        let db = &*self.db;

        let (invoice, order) = self.load_linked_records(invoice_id, order_id).await?;

        if !actor.is_admin() && order.user_id != actor.id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another user".to_string(),
            ));
        }

        let reference = gateway_reference(invoice_id, initiated_at);
        let transaction = self
            .gateway
            .fetch_transaction(&reference)
            .await
            .map_err(ServiceError::from)?;

        let (target_payment, target_order) = map_gateway_state(transaction.state);

        let current_payment = PaymentStatus::from_str(&invoice.payment_status).map_err(|_| {
            ServiceError::InternalError(format!(
                "Unknown payment status '{}'",
                invoice.payment_status
            ))
        })?;
        let current_order_status = parse_status(&order.status)?;

        // A settled invoice is never downgraded; late "pending" reads from
        // the gateway must not unwind a confirmed payment.
        let payment_transition_allowed =
            current_payment != PaymentStatus::Paid || target_payment == PaymentStatus::Paid;

        let payment_changed = payment_transition_allowed && current_payment != target_payment;
        let instrument_changed = transaction.payment_type.is_some()
            && transaction.payment_type != invoice.specific_payment_method;
        // Reconciliation only performs the confirmed / rejected transitions;
        // an order an admin already advanced past awaiting-payment is left
        // alone.
        let order_changed = payment_transition_allowed
            && current_order_status == OrderStatus::AwaitingPayment
            && target_order != current_order_status;

        let effective_payment = if payment_changed {
            target_payment
        } else {
            current_payment
        };
        let effective_order = if order_changed {
            target_order
        } else {
            current_order_status
        };
        let effective_instrument = if instrument_changed {
            transaction.payment_type.clone()
        } else {
            invoice.specific_payment_method.clone()
        };

        if !payment_changed && !instrument_changed && !order_changed {
            // Stored state already matches the gateway; no write at all.
            return Ok(ReconcileResponse {
                payment_status: current_payment,
                order_status: current_order_status,
                specific_payment_method: invoice.specific_payment_method,
            });
        }

        let now = Utc::now();
        let txn = db.begin().await?;

        if payment_changed || instrument_changed {
            let mut active: invoice::ActiveModel = invoice.clone().into();
            if payment_changed {
                active.payment_status = Set(target_payment.to_string());
                if target_payment == PaymentStatus::Paid {
                    active.payment_date = Set(Some(transaction.settled_at.unwrap_or(now)));
                }
            }
            if instrument_changed {
                active.specific_payment_method = Set(transaction.payment_type.clone());
            }
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
        }

        if order_changed {
            let result = OrderEntity::update_many()
                .col_expr(
                    order::Column::Status,
                    Expr::value(effective_order.to_string()),
                )
                .col_expr(
                    order::Column::IsPaid,
                    Expr::value(effective_order == OrderStatus::PaymentConfirmed),
                )
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
                .col_expr(order::Column::Version, Expr::value(order.version + 1))
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Version.eq(order.version))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                // A concurrent reconciliation may have landed the same target
                // already; that race is self-healing. Anything else is a
                // genuine conflict.
                let current = OrderEntity::find_by_id(order_id)
                    .one(&txn)
                    .await?
                    .map(|o| o.status);
                if current.as_deref() != Some(effective_order.to_string().as_str()) {
                    txn.rollback().await?;
                    return Err(ServiceError::Conflict(format!(
                        "Order {} was modified concurrently; retry the status check",
                        order_id
                    )));
                }
            }
        }

        txn.commit().await?;

        info!(
            invoice_id = %invoice_id,
            order_id = %order_id,
            payment_status = %effective_payment,
            order_status = %effective_order,
            "Payment status reconciled"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentReconciled {
                invoice_id,
                order_id,
                payment_status: effective_payment.to_string(),
                order_status: effective_order.to_string(),
            })
            .await
        {
            warn!(error = %e, invoice_id = %invoice_id, "Failed to send reconciliation event");
        }

        Ok(ReconcileResponse {
            payment_status: effective_payment,
            order_status: effective_order,
            specific_payment_method: effective_instrument,
        })
    }

    /// Loads the invoice and order and verifies they belong to the same
    /// detail chain; a broken link reads as NotFound, not as corruption.
    async fn load_linked_records(
        &self,
        invoice_id: Uuid,
        order_id: Uuid,
    ) -> Result<(InvoiceModel, OrderModel), ServiceError> {
        let db = &*self.db;

        let invoice = InvoiceEntity::find_by_id(invoice_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        let detail: OrderDetailModel = OrderDetailEntity::find_by_id(invoice.order_detail_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Order detail {} not found",
                    invoice.order_detail_id
                ))
            })?;

        if detail.order_id != order_id {
            return Err(ServiceError::NotFound(format!(
                "Invoice {} does not belong to order {}",
                invoice_id, order_id
            )));
        }

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok((invoice, order))
    }
}
