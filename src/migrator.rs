use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250601_000001_create_commerce_tables::Migration)]
    }
}

mod m20250601_000001_create_commerce_tables {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(
                            ColumnDef::new(Users::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Phone).string())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::Cart).json().not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::TotalWeight).integer().not_null())
                        .col(ColumnDef::new(Orders::IsPaid).boolean().not_null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Orders::Version).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_user")
                                .from(Orders::Table, Orders::UserId)
                                .to(Users::Table, Users::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderDetails::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::RecipientName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::RecipientPhone)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::Street).string().not_null())
                        .col(ColumnDef::new(OrderDetails::Province).string().not_null())
                        .col(ColumnDef::new(OrderDetails::Regency).string().not_null())
                        .col(ColumnDef::new(OrderDetails::District).string().not_null())
                        .col(ColumnDef::new(OrderDetails::Zipcode).string().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::ShippingCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::Note).string())
                        .col(ColumnDef::new(OrderDetails::Items).json().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::UpdatedAt).timestamp_with_time_zone())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_order")
                                .from(OrderDetails::Table, OrderDetails::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One detail row per order
            manager
                .create_index(
                    Index::create()
                        .name("idx_order_details_order_id")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Invoices::OrderDetailId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Invoices::SpecificPaymentMethod).string())
                        .col(ColumnDef::new(Invoices::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Invoices::PaymentDate).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::UpdatedAt).timestamp_with_time_zone())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_order_detail")
                                .from(Invoices::Table, Invoices::OrderDetailId)
                                .to(OrderDetails::Table, OrderDetails::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One invoice per order detail
            manager
                .create_index(
                    Index::create()
                        .name("idx_invoices_order_detail_id")
                        .table(Invoices::Table)
                        .col(Invoices::OrderDetailId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        Phone,
        Role,
        Cart,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        OrderDate,
        DeliveryDate,
        TotalAmount,
        TotalWeight,
        IsPaid,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum OrderDetails {
        Table,
        Id,
        OrderId,
        RecipientName,
        RecipientPhone,
        Street,
        Province,
        Regency,
        District,
        Zipcode,
        ShippingCost,
        Amount,
        Note,
        Items,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        OrderDetailId,
        PaymentMethod,
        SpecificPaymentMethod,
        PaymentStatus,
        PaymentDate,
        CreatedAt,
        UpdatedAt,
    }
}
