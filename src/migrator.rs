use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_products_table::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_order_details_table::Migration),
            Box::new(m20240301_000004_create_stock_table::Migration),
        ]
    }
}

mod m20240301_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_products_table"
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
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(ColumnDef::new(Products::UnitPriceExclTax).decimal().not_null())
                        .col(ColumnDef::new(Products::UnitPriceInclTax).decimal().not_null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        UnitPriceExclTax,
        UnitPriceInclTax,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_table"
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
                        .col(
                            ColumnDef::new(Orders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::ItemCount).integer().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalExclTax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalInclTax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::OrderDate).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_date")
                        .table(Orders::Table)
                        .col(Orders::OrderDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        ItemCount,
        TotalExclTax,
        TotalInclTax,
        OrderDate,
    }
}

mod m20240301_000003_create_order_details_table {
    use super::m20240301_000002_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_details_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderDetails::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderDetails::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(OrderDetails::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderDetails::UnitPriceExclTax).decimal().not_null())
                        .col(ColumnDef::new(OrderDetails::UnitPriceInclTax).decimal().not_null())
                        .col(ColumnDef::new(OrderDetails::SubtotalExclTax).decimal().not_null())
                        .col(ColumnDef::new(OrderDetails::SubtotalInclTax).decimal().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_order_id")
                                .from(OrderDetails::Table, OrderDetails::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_details_order_id")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderDetails {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPriceExclTax,
        UnitPriceInclTax,
        SubtotalExclTax,
        SubtotalInclTax,
    }
}

mod m20240301_000004_create_stock_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_stock_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // product_id is a soft reference; no foreign key
            manager
                .create_table(
                    Table::create()
                        .table(Stock::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Stock::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Stock::ProductId)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Stock::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Stock::LastStockedDate).timestamp().null())
                        .col(ColumnDef::new(Stock::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Stock::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Stock {
        Table,
        Id,
        ProductId,
        Quantity,
        LastStockedDate,
        UpdatedAt,
    }
}
