use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::DbPool,
    entities::invoice::{self, Entity as InvoiceEntity, Model as InvoiceModel},
    entities::order::{Entity as OrderEntity, Model as OrderModel},
    entities::order_detail::{self, Entity as OrderDetailEntity, Model as OrderDetailModel},
    entities::user::{Entity as UserEntity, Model as UserModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::mailer::{Mailer, OutboundEmail},
};

/// One rendered invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceLineView {
    pub name: String,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Flat, human-readable invoice assembled from Invoice + OrderDetail +
/// Order + User. Read-side only; rendering never writes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceView {
    pub invoice_id: Uuid,
    pub invoice_code: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub orderer_name: String,
    pub orderer_email: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub shipping_address: String,
    pub order_date: String,
    pub delivery_date: String,
    pub items: Vec<InvoiceLineView>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub grand_total: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_date: Option<String>,
    pub order_status: String,
}

/// Outcome of an email dispatch; `sent == false` carries the reason but is
/// still a successful API call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailDispatch {
    pub sent: bool,
    pub recipient: String,
    pub error: Option<String>,
}

/// Read-side invoice projection and optional email rendering.
#[derive(Clone)]
pub struct InvoicingService {
    db: Arc<DbPool>,
    mailer: Arc<dyn Mailer>,
    event_sender: Arc<EventSender>,
}

impl InvoicingService {
    pub fn new(db: Arc<DbPool>, mailer: Arc<dyn Mailer>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            mailer,
            event_sender,
        }
    }

    /// Renders the invoice view by invoice id.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn render(&self, actor: Actor, invoice_id: Uuid) -> Result<InvoiceView, ServiceError> {
        let db = &*self.db;

        let invoice = InvoiceEntity::find_by_id(invoice_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        let detail = OrderDetailEntity::find_by_id(invoice.order_detail_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Order detail {} not found",
                    invoice.order_detail_id
                ))
            })?;

        self.assemble(actor, invoice, detail).await
    }

    /// Renders the invoice view for an order (used by the email endpoint).
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn render_for_order(
        &self,
        actor: Actor,
        order_id: Uuid,
    ) -> Result<InvoiceView, ServiceError> {
        let db = &*self.db;

        let detail = OrderDetailEntity::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order detail for order {} not found", order_id))
            })?;

        let invoice = InvoiceEntity::find()
            .filter(invoice::Column::OrderDetailId.eq(detail.id))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Invoice for order {} not found", order_id))
            })?;

        self.assemble(actor, invoice, detail).await
    }

    /// Renders the invoice for an order and dispatches it to the orderer's
    /// email. A failed send is reported in the result, never retried, and
    /// never rolls anything back.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn send_by_email(
        &self,
        actor: Actor,
        order_id: Uuid,
    ) -> Result<EmailDispatch, ServiceError> {
        let view = self.render_for_order(actor, order_id).await?;
        let recipient = view.orderer_email.clone();

        let message = OutboundEmail {
            to: recipient.clone(),
            subject: format!("Invoice {} — {}", view.invoice_code, view.order_number),
            html_body: render_email_html(&view),
        };

        match self.mailer.send(&message).await {
            Ok(()) => {
                if let Err(e) = self
                    .event_sender
                    .send(Event::InvoiceEmailSent {
                        order_id,
                        recipient: recipient.clone(),
                    })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to send invoice email event");
                }
                Ok(EmailDispatch {
                    sent: true,
                    recipient,
                    error: None,
                })
            }
            Err(e) => {
                warn!(error = %e, order_id = %order_id, "Invoice email dispatch failed");
                Ok(EmailDispatch {
                    sent: false,
                    recipient,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    async fn assemble(
        &self,
        actor: Actor,
        invoice: InvoiceModel,
        detail: OrderDetailModel,
    ) -> Result<InvoiceView, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find_by_id(detail.order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", detail.order_id))
            })?;

        if !actor.is_admin() && order.user_id != actor.id {
            return Err(ServiceError::Forbidden(
                "Invoice belongs to another user".to_string(),
            ));
        }

        let user = UserEntity::find_by_id(order.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", order.user_id)))?;

        build_view(&invoice, &detail, &order, &user)
    }
}

/// Pure assembly of the flat view from the four records.
pub fn build_view(
    invoice: &InvoiceModel,
    detail: &OrderDetailModel,
    order: &OrderModel,
    user: &UserModel,
) -> Result<InvoiceView, ServiceError> {
    let items = detail
        .line_items()?
        .into_iter()
        .map(|item| InvoiceLineView {
            name: item.name,
            size: item.size,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
        })
        .collect();

    Ok(InvoiceView {
        invoice_id: invoice.id,
        invoice_code: invoice_code(invoice.id, order.order_date),
        order_id: order.id,
        order_number: order.order_number.clone(),
        orderer_name: user.name.clone(),
        orderer_email: user.email.clone(),
        recipient_name: detail.recipient_name.clone(),
        recipient_phone: detail.recipient_phone.clone(),
        shipping_address: format!(
            "{}, {}, {}, {} {}",
            detail.street, detail.district, detail.regency, detail.province, detail.zipcode
        ),
        order_date: format_date(order.order_date),
        delivery_date: format_date(order.delivery_date),
        items,
        subtotal: detail.amount,
        shipping_cost: detail.shipping_cost,
        grand_total: order.total_amount,
        payment_method: invoice
            .specific_payment_method
            .clone()
            .unwrap_or_else(|| invoice.payment_method.clone()),
        payment_status: invoice.payment_status.clone(),
        payment_date: invoice.payment_date.map(format_date),
        order_status: order.status.clone(),
    })
}

/// `INV/{yyyyMMdd}/{first 8 of the invoice id, uppercased}`
pub fn invoice_code(invoice_id: Uuid, order_date: DateTime<Utc>) -> String {
    format!(
        "INV/{}/{}",
        order_date.format("%Y%m%d"),
        invoice_id.to_string()[..8].to_uppercase()
    )
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Minimal HTML rendering of the invoice for the outbound email.
pub fn render_email_html(view: &InvoiceView) -> String {
    let mut rows = String::new();
    for item in &view.items {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            item.name, item.size, item.quantity, item.unit_price, item.line_total
        ));
    }

    format!(
        "<h1>{code}</h1>\
         <p>Order {number} — {status}</p>\
         <p>Ship to: {recipient} ({phone})<br>{address}</p>\
         <table>\
         <tr><th>Item</th><th>Size</th><th>Qty</th><th>Unit</th><th>Total</th></tr>\
         {rows}\
         </table>\
         <p>Subtotal: {subtotal}<br>Shipping: {shipping}<br><strong>Total: {total}</strong></p>\
         <p>Payment: {method} — {payment_status}</p>",
        code = view.invoice_code,
        number = view.order_number,
        status = view.order_status,
        recipient = view.recipient_name,
        phone = view.recipient_phone,
        address = view.shipping_address,
        rows = rows,
        subtotal = view.subtotal,
        shipping = view.shipping_cost,
        total = view.grand_total,
        method = view.payment_method,
        payment_status = view.payment_status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::invoice::PaymentStatus;
    use crate::entities::order::OrderStatus;
    use crate::entities::order_detail::LineItem;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fixture() -> (InvoiceModel, OrderDetailModel, OrderModel, UserModel) {
        let now = Utc.with_ymd_and_hms(2025, 6, 9, 8, 0, 0).unwrap();
        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let detail_id = Uuid::new_v4();

        let items = vec![LineItem {
            product_id: Uuid::new_v4(),
            name: "Batik Shirt".to_string(),
            quantity: 2,
            unit_price: dec!(150000),
            line_total: dec!(300000),
            size: "M".to_string(),
            image_url: None,
        }];

        let invoice = InvoiceModel {
            id: Uuid::new_v4(),
            order_detail_id: detail_id,
            payment_method: "gateway checkout".to_string(),
            specific_payment_method: None,
            payment_status: PaymentStatus::Pending.to_string(),
            payment_date: None,
            created_at: now,
            updated_at: None,
        };
        let detail = OrderDetailModel {
            id: detail_id,
            order_id,
            recipient_name: "Siti Rahma".to_string(),
            recipient_phone: "0812345678901".to_string(),
            street: "Jl. Melati 5".to_string(),
            province: "Jawa Barat".to_string(),
            regency: "Bandung".to_string(),
            district: "Coblong".to_string(),
            zipcode: "40132".to_string(),
            shipping_cost: dec!(20000),
            amount: dec!(300000),
            note: None,
            items: serde_json::to_value(&items).unwrap(),
            created_at: now,
            updated_at: None,
        };
        let order = OrderModel {
            id: order_id,
            order_number: "ORD-1A2B3C4D".to_string(),
            user_id,
            status: OrderStatus::AwaitingPayment.to_string(),
            order_date: now,
            delivery_date: now + chrono::Duration::days(5),
            total_amount: dec!(320000),
            total_weight: 600,
            is_paid: false,
            created_at: now,
            updated_at: None,
            version: 1,
        };
        let user = UserModel {
            id: user_id,
            name: "Siti Rahma".to_string(),
            email: "siti@example.com".to_string(),
            phone: Some("0812345678901".to_string()),
            role: "customer".to_string(),
            cart: serde_json::json!({}),
            created_at: now,
            updated_at: None,
        };

        (invoice, detail, order, user)
    }

    #[test]
    fn invoice_code_embeds_date_and_short_id() {
        let date = Utc.with_ymd_and_hms(2025, 6, 9, 8, 0, 0).unwrap();
        let id = Uuid::parse_str("1a2b3c4d-0000-0000-0000-000000000000").unwrap();
        assert_eq!(invoice_code(id, date), "INV/20250609/1A2B3C4D");
    }

    #[test]
    fn view_joins_all_four_records() {
        let (invoice, detail, order, user) = fixture();
        let view = build_view(&invoice, &detail, &order, &user).unwrap();

        assert_eq!(view.order_number, "ORD-1A2B3C4D");
        assert_eq!(view.orderer_email, "siti@example.com");
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.subtotal, dec!(300000));
        assert_eq!(view.shipping_cost, dec!(20000));
        assert_eq!(view.grand_total, dec!(320000));
        assert_eq!(view.payment_method, "gateway checkout");
        assert_eq!(view.order_date, "09-06-2025");
        assert!(view.shipping_address.contains("Bandung"));
    }

    #[test]
    fn specific_instrument_replaces_method_label() {
        let (mut invoice, detail, order, user) = fixture();
        invoice.specific_payment_method = Some("bank_transfer".to_string());

        let view = build_view(&invoice, &detail, &order, &user).unwrap();
        assert_eq!(view.payment_method, "bank_transfer");
    }

    #[test]
    fn email_rendering_contains_totals_and_lines() {
        let (invoice, detail, order, user) = fixture();
        let view = build_view(&invoice, &detail, &order, &user).unwrap();
        let html = render_email_html(&view);

        assert!(html.contains("Batik Shirt"));
        assert!(html.contains("320000"));
        assert!(html.contains(&view.invoice_code));
    }
}
