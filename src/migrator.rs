use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_suppliers_tables::Migration),
            Box::new(m20250101_000002_create_cost_centers_table::Migration),
            Box::new(m20250101_000003_create_purchase_orders_tables::Migration),
            Box::new(m20250101_000004_create_budgets_table::Migration),
            Box::new(m20250101_000005_create_document_sequences_table::Migration),
        ]
    }
}

mod m20250101_000001_create_suppliers_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_suppliers_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Suppliers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::ContactPerson).string().null())
                        .col(ColumnDef::new(Suppliers::Email).string().null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).string().null())
                        .col(ColumnDef::new(Suppliers::City).string().null())
                        .col(ColumnDef::new(Suppliers::Country).string().null())
                        .col(ColumnDef::new(Suppliers::TaxId).string().null())
                        .col(ColumnDef::new(Suppliers::PaymentTerms).string().null())
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SupplierProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierProducts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::SupplierId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::ProductCode)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SupplierProducts::Description).text().null())
                        .col(
                            ColumnDef::new(SupplierProducts::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::Currency)
                                .string_len(3)
                                .not_null()
                                .default("CLP"),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::UnitOfMeasure)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::AvailabilityStatus)
                                .string()
                                .not_null()
                                .default("available"),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierProducts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_products_supplier_id")
                                .from(SupplierProducts::Table, SupplierProducts::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_products_supplier_id")
                        .table(SupplierProducts::Table)
                        .col(SupplierProducts::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_products_supplier_name")
                        .table(SupplierProducts::Table)
                        .col(SupplierProducts::SupplierId)
                        .col(SupplierProducts::ProductName)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplierProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Suppliers {
        Table,
        Id,
        Name,
        ContactPerson,
        Email,
        Phone,
        Address,
        City,
        Country,
        TaxId,
        PaymentTerms,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SupplierProducts {
        Table,
        Id,
        SupplierId,
        ProductName,
        ProductCode,
        Description,
        UnitPrice,
        Currency,
        UnitOfMeasure,
        AvailabilityStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_cost_centers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_cost_centers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CostCenters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CostCenters::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CostCenters::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CostCenters::Name).string().not_null())
                        .col(ColumnDef::new(CostCenters::Description).text().null())
                        .col(ColumnDef::new(CostCenters::Owner).string().null())
                        .col(
                            ColumnDef::new(CostCenters::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(CostCenters::CenterType).string().null())
                        .col(ColumnDef::new(CostCenters::Manager).string().null())
                        .col(ColumnDef::new(CostCenters::Email).string().null())
                        .col(ColumnDef::new(CostCenters::Department).string().null())
                        .col(
                            ColumnDef::new(CostCenters::Currency)
                                .string_len(3)
                                .not_null()
                                .default("CLP"),
                        )
                        .col(
                            ColumnDef::new(CostCenters::ApprovalLimit)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CostCenters::RequiresApproval)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CostCenters::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CostCenters::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CostCenters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CostCenters {
        Table,
        Id,
        Code,
        Name,
        Description,
        Owner,
        IsActive,
        CenterType,
        Manager,
        Email,
        Department,
        Currency,
        ApprovalLimit,
        RequiresApproval,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_purchase_orders_tables {
    use super::m20250101_000001_create_suppliers_tables::{SupplierProducts, Suppliers};
    use super::m20250101_000002_create_cost_centers_table::CostCenters;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_purchase_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).integer().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CostCenterId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Currency)
                                .string_len(3)
                                .not_null()
                                .default("CLP"),
                        )
                        .col(ColumnDef::new(PurchaseOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(PurchaseOrders::DeliveryDate).date().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TaxAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseOrders::PaymentTerms).string().null())
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ColumnDef::new(PurchaseOrders::BillingAddress).text().null())
                        .col(ColumnDef::new(PurchaseOrders::ShippingAddress).text().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_supplier_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_cost_center_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::CostCenterId)
                                .to(CostCenters::Table, CostCenters::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::OrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductId)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductCode)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Description)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitOfMeasure)
                                .string()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_order_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::OrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_product_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::ProductId)
                                .to(SupplierProducts::Table, SupplierProducts::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_purchase_orders_supplier_id", PurchaseOrders::SupplierId),
                ("idx_purchase_orders_cost_center_id", PurchaseOrders::CostCenterId),
                ("idx_purchase_orders_order_date", PurchaseOrders::OrderDate),
                ("idx_purchase_orders_status", PurchaseOrders::Status),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(PurchaseOrders::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_items_order_id")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        OrderNumber,
        SupplierId,
        CostCenterId,
        Currency,
        OrderDate,
        DeliveryDate,
        Status,
        Subtotal,
        TaxAmount,
        TotalAmount,
        PaymentTerms,
        Notes,
        BillingAddress,
        ShippingAddress,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductName,
        ProductCode,
        Description,
        Quantity,
        UnitPrice,
        TotalPrice,
        UnitOfMeasure,
    }
}

mod m20250101_000004_create_budgets_table {
    use super::m20250101_000002_create_cost_centers_table::CostCenters;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_budgets_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Budgets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Budgets::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Budgets::CostCenterId).integer().not_null())
                        .col(ColumnDef::new(Budgets::Month).string_len(7).not_null())
                        .col(
                            ColumnDef::new(Budgets::Currency)
                                .string_len(3)
                                .not_null()
                                .default("CLP"),
                        )
                        .col(
                            ColumnDef::new(Budgets::Amount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Budgets::Category).string().null())
                        .col(ColumnDef::new(Budgets::Description).text().null())
                        .col(ColumnDef::new(Budgets::Priority).string().null())
                        .col(ColumnDef::new(Budgets::Approver).string().null())
                        .col(
                            ColumnDef::new(Budgets::WarningThreshold)
                                .decimal_len(7, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Budgets::CriticalThreshold)
                                .decimal_len(7, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Budgets::OverspendLimit)
                                .decimal_len(7, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Budgets::AutoAdjust)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Budgets::RolloverUnused)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Budgets::RequireApproval)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Budgets::EmailAlerts)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Budgets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Budgets::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_budgets_cost_center_id")
                                .from(Budgets::Table, Budgets::CostCenterId)
                                .to(CostCenters::Table, CostCenters::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_budgets_cost_center_month_currency")
                        .table(Budgets::Table)
                        .col(Budgets::CostCenterId)
                        .col(Budgets::Month)
                        .col(Budgets::Currency)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_budgets_month")
                        .table(Budgets::Table)
                        .col(Budgets::Month)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Budgets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Budgets {
        Table,
        Id,
        CostCenterId,
        Month,
        Currency,
        Amount,
        Category,
        Description,
        Priority,
        Approver,
        WarningThreshold,
        CriticalThreshold,
        OverspendLimit,
        AutoAdjust,
        RolloverUnused,
        RequireApproval,
        EmailAlerts,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000005_create_document_sequences_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_document_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DocumentSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentSequences::Scope)
                                .string()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::LastValue)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DocumentSequences {
        Table,
        Scope,
        LastValue,
    }
}
