use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    /// One of the [`OrderStatus`] labels; parsed at the service boundary.
    pub status: String,
    pub order_date: DateTime<Utc>,
    /// Requested delivery date, at least two days after the order date.
    pub delivery_date: DateTime<Utc>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    /// Total shipment weight in grams.
    pub total_weight: i32,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::order_detail::Entity")]
    OrderDetail,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderDetail.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(self)
    }
}

/// Order lifecycle states. The wire and database representation keeps the
/// customer-facing Indonesian labels used throughout the shop.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    StrumEnumIter,
    ToSchema,
)]
pub enum OrderStatus {
    #[serde(rename = "Menunggu Pembayaran")]
    #[strum(serialize = "Menunggu Pembayaran")]
    AwaitingPayment,
    #[serde(rename = "Pembayaran Dikonfirmasi")]
    #[strum(serialize = "Pembayaran Dikonfirmasi")]
    PaymentConfirmed,
    /// Set by payment reconciliation only, never by an administrator.
    #[serde(rename = "Pembayaran Ditolak")]
    #[strum(serialize = "Pembayaran Ditolak")]
    PaymentRejected,
    #[serde(rename = "Diproses")]
    #[strum(serialize = "Diproses")]
    Processing,
    #[serde(rename = "Dikirim")]
    #[strum(serialize = "Dikirim")]
    Shipped,
    #[serde(rename = "Selesai")]
    #[strum(serialize = "Selesai")]
    Completed,
    #[serde(rename = "Dibatalkan")]
    #[strum(serialize = "Dibatalkan")]
    Cancelled,
}

impl OrderStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::PaymentRejected
        )
    }
}
