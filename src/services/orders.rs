use crate::{
    auth::Actor,
    db::DbPool,
    entities::invoice::{self, Entity as InvoiceEntity, PaymentStatus},
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_detail::{self, Entity as OrderDetailEntity, LineItem},
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Initial payment method label; refined once the gateway reports the
/// instrument actually used.
const INITIAL_PAYMENT_METHOD: &str = "gateway checkout";

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10,15}$").expect("phone pattern is valid"));

fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount must be greater than 0".into());
        Err(err)
    }
}

fn validate_non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount must not be negative".into());
        Err(err)
    }
}

/// Delivery must be booked at least two calendar days out, compared at day
/// granularity (time of day is ignored); exactly today+2 is accepted.
fn validate_delivery_window(value: &DateTime<Utc>) -> Result<(), ValidationError> {
    let earliest = Utc::now().date_naive() + Duration::days(2);
    if value.date_naive() >= earliest {
        Ok(())
    } else {
        let mut err = ValidationError::new("delivery_window");
        err.message = Some("Delivery date must be at least two days from today".into());
        Err(err)
    }
}

/// Shipping destination; every sub-field is required.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "Province is required"))]
    pub province: String,
    #[validate(length(min = 1, message = "Regency is required"))]
    pub regency: String,
    #[validate(length(min = 1, message = "District is required"))]
    pub district: String,
    #[validate(length(min = 1, message = "Zipcode is required"))]
    pub zipcode: String,
}

/// One line of the checkout payload; becomes a frozen [`LineItem`] snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub size: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<CheckoutItem>,
    #[validate]
    pub shipping_address: AddressInput,
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub recipient_name: String,
    #[validate(regex(path = "PHONE_RE", message = "Recipient phone must be 10-15 digits"))]
    pub recipient_phone: String,
    #[validate(custom = "validate_delivery_window")]
    pub delivery_date: DateTime<Utc>,
    #[validate(custom = "validate_non_negative_decimal")]
    pub shipping_cost: Decimal,
    /// Item subtotal, before shipping.
    #[validate(custom = "validate_positive_decimal")]
    pub amount: Decimal,
    #[validate(custom = "validate_positive_decimal")]
    pub total_amount: Decimal,
    /// Total shipment weight in grams.
    #[validate(range(min = 0, message = "Total weight must not be negative"))]
    pub total_weight: i32,
    pub note: Option<String>,
}

/// The three ids produced by a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub order_detail_id: Uuid,
    pub invoice_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: String,
    pub order_date: DateTime<Utc>,
    pub delivery_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub total_weight: i32,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailView {
    pub id: Uuid,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub street: String,
    pub province: String,
    pub regency: String,
    pub district: String,
    pub zipcode: String,
    pub shipping_cost: Decimal,
    pub amount: Decimal,
    pub note: Option<String>,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub payment_method: String,
    pub specific_payment_method: Option<String>,
    pub payment_status: String,
    pub payment_date: Option<DateTime<Utc>>,
}

/// Joined read view. `detail`/`invoice` may be absent for a moment while a
/// checkout is still in flight (or was compensated); readers treat that as
/// "not ready yet", never as an error.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub detail: Option<OrderDetailView>,
    pub invoice: Option<InvoiceSummary>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Ids of records created so far in one checkout attempt, tracked so a
/// failure can undo them in reverse order.
#[derive(Debug, Default)]
struct CreatedRecords {
    order_id: Option<Uuid>,
    order_detail_id: Option<Uuid>,
    invoice_id: Option<Uuid>,
}

/// Order placement and order reads.
///
/// Checkout performs four sequential durable writes (order, detail, invoice,
/// cart clear) without a wrapping transaction; on failure the completed
/// inserts are deleted in reverse order before the error is returned.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Converts a validated checkout payload into the durable
    /// Order + OrderDetail + Invoice triple and clears the caller's cart.
    ///
    /// Fails cleanly: on a validation error nothing was written; on a write
    /// error the records created so far are compensated before returning.
    #[instrument(skip(self, request), fields(user_id = %actor.id))]
    pub async fn place_order(
        &self,
        actor: Actor,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(flatten_validation_errors(&e)))?;
        validate_items(&request.items)?;

        let db = &*self.db;

        // Fetched before any write; a missing account fails the whole
        // checkout without compensation.
        let user = UserEntity::find_by_id(actor.id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", actor.id)))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_detail_id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let mut created = CreatedRecords::default();

        // Step 1: order record, awaiting payment.
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            user_id: Set(actor.id),
            status: Set(OrderStatus::AwaitingPayment.to_string()),
            order_date: Set(now),
            delivery_date: Set(request.delivery_date),
            total_amount: Set(request.total_amount),
            total_weight: Set(request.total_weight),
            is_paid: Set(false),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        if let Err(e) = order_model.insert(db).await {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            return Err(ServiceError::DatabaseError(e));
        }
        created.order_id = Some(order_id);

        // Step 2: detail row with the frozen item snapshot.
        let snapshot: Vec<LineItem> = request.items.iter().map(to_line_item).collect();
        let items_json = match serde_json::to_value(&snapshot) {
            Ok(v) => v,
            Err(e) => {
                self.compensate(&created).await;
                return Err(ServiceError::SerializationError(e.to_string()));
            }
        };
        let detail_model = order_detail::ActiveModel {
            id: Set(order_detail_id),
            order_id: Set(order_id),
            recipient_name: Set(request.recipient_name.clone()),
            recipient_phone: Set(request.recipient_phone.clone()),
            street: Set(request.shipping_address.street.clone()),
            province: Set(request.shipping_address.province.clone()),
            regency: Set(request.shipping_address.regency.clone()),
            district: Set(request.shipping_address.district.clone()),
            zipcode: Set(request.shipping_address.zipcode.clone()),
            shipping_cost: Set(request.shipping_cost),
            amount: Set(request.amount),
            note: Set(request.note.clone()),
            items: Set(items_json),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        if let Err(e) = detail_model.insert(db).await {
            error!(error = %e, order_id = %order_id, "Failed to insert order detail");
            self.compensate(&created).await;
            return Err(ServiceError::DatabaseError(e));
        }
        created.order_detail_id = Some(order_detail_id);

        // Step 3: invoice in Pending state.
        let invoice_model = invoice::ActiveModel {
            id: Set(invoice_id),
            order_detail_id: Set(order_detail_id),
            payment_method: Set(INITIAL_PAYMENT_METHOD.to_string()),
            specific_payment_method: Set(None),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            payment_date: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        if let Err(e) = invoice_model.insert(db).await {
            error!(error = %e, order_id = %order_id, "Failed to insert invoice");
            self.compensate(&created).await;
            return Err(ServiceError::DatabaseError(e));
        }
        created.invoice_id = Some(invoice_id);

        // Step 4: clear the cart. A failure here still unwinds the three
        // inserts; the caller retries the whole checkout.
        let mut user_active: user::ActiveModel = user.into();
        user_active.cart = Set(serde_json::json!({}));
        user_active.updated_at = Set(Some(now));
        if let Err(e) = user_active.update(db).await {
            error!(error = %e, order_id = %order_id, "Failed to clear cart after checkout");
            self.compensate(&created).await;
            return Err(ServiceError::DatabaseError(e));
        }

        info!(
            order_id = %order_id,
            order_detail_id = %order_detail_id,
            invoice_id = %invoice_id,
            "Order placed"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::OrderPlaced {
                    order_id,
                    order_detail_id,
                    invoice_id,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order placed event");
            }
        }

        Ok(PlaceOrderResponse {
            order_id,
            order_detail_id,
            invoice_id,
        })
    }

    /// Deletes the records created by a failed checkout, newest first.
    /// Failures are logged and skipped; the caller still sees the original
    /// error, never a cleanup error.
    async fn compensate(&self, created: &CreatedRecords) {
        let db = &*self.db;

        if let Some(invoice_id) = created.invoice_id {
            if let Err(e) = InvoiceEntity::delete_by_id(invoice_id).exec(db).await {
                error!(error = %e, invoice_id = %invoice_id, "Compensation failed to delete invoice");
            }
        }
        if let Some(detail_id) = created.order_detail_id {
            if let Err(e) = OrderDetailEntity::delete_by_id(detail_id).exec(db).await {
                error!(error = %e, order_detail_id = %detail_id, "Compensation failed to delete order detail");
            }
        }
        if let Some(order_id) = created.order_id {
            if let Err(e) = OrderEntity::delete_by_id(order_id).exec(db).await {
                error!(error = %e, order_id = %order_id, "Compensation failed to delete order");
            }

            warn!(order_id = %order_id, "Order placement compensated");
            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::OrderPlacementCompensated { order_id })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to send compensation event");
                }
            }
        }
    }

    /// Joined view of one order. Customers see only their own orders.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, actor: Actor, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !actor.is_admin() && order.user_id != actor.id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another user".to_string(),
            ));
        }

        // The detail may not exist yet (checkout in flight or compensated);
        // readers see the order as not-yet-ready rather than an error.
        let detail = OrderDetailEntity::find()
            .filter(order_detail::Column::OrderId.eq(order_id))
            .one(db)
            .await?;

        let invoice = match &detail {
            Some(d) => {
                InvoiceEntity::find()
                    .filter(invoice::Column::OrderDetailId.eq(d.id))
                    .one(db)
                    .await?
            }
            None => None,
        };

        let detail_view = match detail {
            Some(d) => {
                let items = d.line_items()?;
                Some(OrderDetailView {
                    id: d.id,
                    recipient_name: d.recipient_name,
                    recipient_phone: d.recipient_phone,
                    street: d.street,
                    province: d.province,
                    regency: d.regency,
                    district: d.district,
                    zipcode: d.zipcode,
                    shipping_cost: d.shipping_cost,
                    amount: d.amount,
                    note: d.note,
                    items,
                })
            }
            None => None,
        };

        Ok(OrderView {
            order: model_to_response(order),
            detail: detail_view,
            invoice: invoice.map(|inv| InvoiceSummary {
                id: inv.id,
                payment_method: inv.payment_method,
                specific_payment_method: inv.specific_payment_method,
                payment_status: inv.payment_status,
                payment_date: inv.payment_date,
            }),
        })
    }

    /// Lists orders with pagination; admins see every order, customers only
    /// their own.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        actor: Actor,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db;
        let page = page.max(1);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if !actor.is_admin() {
            query = query.filter(order::Column::UserId.eq(actor.id));
        }

        let paginator = query.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }
}

fn to_line_item(item: &CheckoutItem) -> LineItem {
    LineItem {
        product_id: item.product_id,
        name: item.name.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        line_total: item.line_total,
        size: item.size.clone(),
        image_url: item.image_url.clone(),
    }
}

fn model_to_response(model: OrderModel) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        user_id: model.user_id,
        status: model.status,
        order_date: model.order_date,
        delivery_date: model.delivery_date,
        total_amount: model.total_amount,
        total_weight: model.total_weight,
        is_paid: model.is_paid,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

/// Per-line checks with positions in the message so the client can point at
/// the offending row.
fn validate_items(items: &[CheckoutItem]) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        let line = index + 1;
        if item.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Line item {}: name is required",
                line
            )));
        }
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Line item {}: quantity must be positive",
                line
            )));
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Line item {}: unit price must be positive",
                line
            )));
        }
        if item.line_total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Line item {}: line total must be positive",
                line
            )));
        }
    }
    Ok(())
}

/// Collapses validator's nested error map into one readable line, keeping
/// the field names so clients can highlight the offending input.
fn flatten_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, kinds) in errors.errors() {
        match kinds {
            validator::ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    parts.push(format!("{}: {}", field, message));
                }
            }
            validator::ValidationErrorsKind::Struct(inner) => {
                parts.push(format!("{}: {}", field, flatten_validation_errors(inner)));
            }
            validator::ValidationErrorsKind::List(map) => {
                for (idx, inner) in map {
                    parts.push(format!(
                        "{}[{}]: {}",
                        field,
                        idx,
                        flatten_validation_errors(inner)
                    ));
                }
            }
        }
    }
    parts.sort();
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn valid_request() -> PlaceOrderRequest {
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

    #[test]
    fn valid_payload_passes_validation() {
        let request = valid_request();
        assert!(request.validate().is_ok());
        assert!(validate_items(&request.items).is_ok());
    }

    #[test]
    fn long_phone_accepted_short_phone_rejected() {
        let mut request = valid_request();
        request.recipient_phone = "0812345678901".to_string();
        assert!(request.validate().is_ok());

        request.recipient_phone = "123".to_string();
        let err = request.validate().unwrap_err();
        assert!(flatten_validation_errors(&err).contains("recipient_phone"));
    }

    #[test]
    fn phone_with_letters_rejected() {
        let mut request = valid_request();
        request.recipient_phone = "08123abc45678".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn delivery_exactly_two_days_out_accepted() {
        let mut request = valid_request();
        // Midnight two days out: date-only comparison must accept it even
        // though fewer than 48 hours remain.
        let date = Utc::now().date_naive() + Duration::days(2);
        request.delivery_date = date
            .and_hms_opt(0, 0, 0)
            .expect("valid time")
            .and_utc();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn delivery_one_day_out_rejected() {
        let mut request = valid_request();
        request.delivery_date = Utc::now() + Duration::days(1);
        let err = request.validate().unwrap_err();
        assert!(flatten_validation_errors(&err).contains("delivery_date"));
    }

    #[test]
    fn empty_items_rejected() {
        let mut request = valid_request();
        request.items.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn missing_address_field_rejected() {
        let mut request = valid_request();
        request.shipping_address.zipcode = String::new();
        let err = request.validate().unwrap_err();
        assert!(flatten_validation_errors(&err).contains("Zipcode is required"));
    }

    #[test]
    fn non_positive_line_item_rejected() {
        let mut request = valid_request();
        request.items[0].quantity = 0;
        assert_matches!(
            validate_items(&request.items),
            Err(ServiceError::ValidationError(msg)) if msg.contains("quantity")
        );

        let mut request = valid_request();
        request.items[0].unit_price = Decimal::ZERO;
        assert_matches!(
            validate_items(&request.items),
            Err(ServiceError::ValidationError(msg)) if msg.contains("unit price")
        );

        let mut request = valid_request();
        request.items[0].name = "  ".to_string();
        assert_matches!(
            validate_items(&request.items),
            Err(ServiceError::ValidationError(msg)) if msg.contains("name")
        );
    }

    #[test]
    fn snapshot_freezes_checkout_lines() {
        let request = valid_request();
        let snapshot: Vec<LineItem> = request.items.iter().map(to_line_item).collect();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].product_id, request.items[0].product_id);
        assert_eq!(snapshot[0].unit_price, dec!(150000));
        assert_eq!(snapshot[0].line_total, dec!(300000));
        assert_eq!(snapshot[0].size, "M");
    }
}
