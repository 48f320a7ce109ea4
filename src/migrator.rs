use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_products_table::Migration),
            Box::new(m20250101_000002_create_carts_table::Migration),
            Box::new(m20250101_000003_create_cart_items_table::Migration),
            Box::new(m20250101_000004_create_orders_table::Migration),
            Box::new(m20250101_000005_create_order_items_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Products::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Description).text().not_null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Products::Variants).json().not_null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_status")
                        .table(Products::Table)
                        .col(Products::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        Name,
        Sku,
        Slug,
        Description,
        Price,
        Currency,
        Stock,
        Status,
        Variants,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_carts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_carts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Carts::UserId).uuid().null())
                        .col(ColumnDef::new(Carts::GuestId).string().null())
                        .col(ColumnDef::new(Carts::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Carts::Subtotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::DiscountTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::TaxTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::ShippingTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::Total)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Carts::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Carts::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            // One live cart per owner
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_user_id")
                        .table(Carts::Table)
                        .col(Carts::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_guest_id")
                        .table(Carts::Table)
                        .col(Carts::GuestId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Carts {
        Table,
        Id,
        UserId,
        GuestId,
        Currency,
        Subtotal,
        DiscountTotal,
        TaxTotal,
        ShippingTotal,
        Total,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_cart_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::VariantKey).string().null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::AddedAt).timestamp().not_null())
                        .col(ColumnDef::new(CartItems::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        VariantKey,
        Quantity,
        UnitPrice,
        AddedAt,
        UpdatedAt,
    }
}

mod m20250101_000004_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TaxTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::GrandTotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PaymentProvider).string().not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentIntentId).string().null())
                        .col(ColumnDef::new(Orders::PaymentChargeId).string().null())
                        .col(ColumnDef::new(Orders::PaymentTransactionId).string().null())
                        .col(
                            ColumnDef::new(Orders::PaymentAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::ShippingMethod).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::BillingAddress).json().null())
                        .col(ColumnDef::new(Orders::ContactInfo).json().not_null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        Currency,
        Subtotal,
        ShippingTotal,
        TaxTotal,
        DiscountTotal,
        GrandTotal,
        PaymentProvider,
        PaymentStatus,
        PaymentIntentId,
        PaymentChargeId,
        PaymentTransactionId,
        PaymentAmount,
        ShippingMethod,
        ShippingAddress,
        BillingAddress,
        ContactInfo,
        Notes,
        TrackingNumber,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000005_create_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantKey).string().null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Sku).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::TotalPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariantKey,
        Name,
        Sku,
        Quantity,
        UnitPrice,
        TotalPrice,
        CreatedAt,
    }
}
