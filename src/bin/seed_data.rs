//! Seed data script - populates the database with demo purchasing data
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 3 cost centers (administration, technology, operations)
//! - budgets for the current month
//! - 2 suppliers with catalog products
//! - received orders for the current and previous month
//!
//! `--hash-password <PASSWORD>` prints an argon2 hash for `auth_password_hash`
//! and exits without touching the database.

use anyhow::Context;
use chrono::Datelike;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

use buytrack_api::{
    auth,
    db::{self, DbConfig, DbPool},
    entities::supplier_product,
    money::Currency,
    period::Month,
    services::{
        budgets::{BudgetService, UpsertBudgetInput},
        cost_centers::{CostCenterInput, CostCenterService},
        orders::{CreateOrderInput, OrderItemInput, OrderService},
        suppliers::{ProductInput, SupplierInput, SupplierService},
    },
};

#[derive(Debug, Parser)]
#[command(name = "seed-data", about = "Populate a BuyTrack database with demo data")]
struct Cli {
    /// Database to seed
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://buytrack.db?mode=rwc")]
    database_url: String,

    /// Print an argon2 hash of the given password and exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,

    /// Skip the sample purchase orders
    #[arg(long)]
    skip_orders: bool,
}

struct SeedCostCenter {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    owner: &'static str,
    currency: Currency,
    budget: Decimal,
}

const COST_CENTERS: [SeedCostCenter; 3] = [
    SeedCostCenter {
        code: "CC-ADM",
        name: "Administración",
        description: "Gastos administrativos",
        owner: "Gerencia",
        currency: Currency::Clp,
        budget: dec!(5000000),
    },
    SeedCostCenter {
        code: "CC-IT",
        name: "Tecnología",
        description: "TI y software",
        owner: "CTO",
        currency: Currency::Usd,
        budget: dec!(3000),
    },
    SeedCostCenter {
        code: "CC-OP",
        name: "Operaciones",
        description: "Gastos de operación",
        owner: "COO",
        currency: Currency::Clp,
        budget: dec!(8000000),
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(password) = cli.hash_password.as_deref() {
        println!("{}", auth::hash_password(password)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== BuyTrack Seed Data ===");
    info!("Connecting to database: {}", cli.database_url);
    let pool = db::establish_connection_with_config(&DbConfig {
        url: cli.database_url.clone(),
        max_connections: 5,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .context("failed to connect to the database")?;
    db::run_migrations(&pool).await?;
    let pool = Arc::new(pool);
    info!("Connected and migrated");

    let cost_centers = CostCenterService::new(pool.clone(), Currency::Clp);
    if !cost_centers.list_cost_centers().await?.is_empty() {
        info!("Database already holds cost centers; nothing to seed");
        return Ok(());
    }

    info!("Creating cost centers and budgets...");
    let center_ids = seed_cost_centers(&pool, &cost_centers).await?;
    info!("  Created {} cost centers", center_ids.len());

    info!("Creating suppliers...");
    let catalog = seed_suppliers(&pool).await?;
    info!("  Created {} suppliers", catalog.len());

    if cli.skip_orders {
        info!("Skipping sample orders");
    } else {
        info!("Creating sample orders...");
        let count = seed_orders(&pool, &center_ids, &catalog).await?;
        info!("  Created {} orders", count);
    }

    info!("=== Seed complete ===");
    Ok(())
}

async fn seed_cost_centers(
    pool: &Arc<DbPool>,
    service: &CostCenterService,
) -> anyhow::Result<Vec<(i32, Currency)>> {
    let budgets = BudgetService::new(pool.clone(), Currency::Clp);
    let month = Month::current().to_string();
    let mut ids = Vec::with_capacity(COST_CENTERS.len());

    for seed in &COST_CENTERS {
        let center = service
            .create_cost_center(CostCenterInput {
                code: seed.code.to_string(),
                name: seed.name.to_string(),
                description: Some(seed.description.to_string()),
                owner: Some(seed.owner.to_string()),
                currency: Some(seed.currency),
                is_active: Some(true),
                ..Default::default()
            })
            .await?;

        budgets
            .upsert_budget(UpsertBudgetInput {
                cost_center_id: Some(center.id),
                month: Some(month.clone()),
                currency: Some(seed.currency),
                amount: Some(seed.budget),
            })
            .await?;
        ids.push((center.id, seed.currency));
    }
    Ok(ids)
}

/// Supplier id with the products created for it
type Catalog = Vec<(i32, Vec<supplier_product::Model>)>;

async fn seed_suppliers(pool: &Arc<DbPool>) -> anyhow::Result<Catalog> {
    let service = SupplierService::new(pool.clone(), Currency::Clp);
    let suppliers = [
        (
            SupplierInput {
                name: "Distribuidora Andes Ltda.".to_string(),
                contact_person: Some("María González".to_string()),
                email: Some("ventas@andes.cl".to_string()),
                phone: Some("+56 2 2345 6789".to_string()),
                address: Some("Av. Providencia 1234".to_string()),
                city: Some("Santiago".to_string()),
                country: Some("Chile".to_string()),
                tax_id: Some("76.123.456-7".to_string()),
                payment_terms: Some("30 días".to_string()),
            },
            vec![
                ("Resma papel carta", "unidad", dec!(4990)),
                ("Tóner impresora láser", "unidad", dec!(45990)),
                ("Silla ergonómica", "unidad", dec!(189990)),
            ],
        ),
        (
            SupplierInput {
                name: "TecnoServicios SpA".to_string(),
                contact_person: Some("Jorge Muñoz".to_string()),
                email: Some("contacto@tecnoservicios.cl".to_string()),
                phone: Some("+56 9 8765 4321".to_string()),
                address: Some("Los Militares 5890".to_string()),
                city: Some("Las Condes".to_string()),
                country: Some("Chile".to_string()),
                tax_id: Some("77.987.654-3".to_string()),
                payment_terms: Some("Contado".to_string()),
            },
            vec![
                ("Mantención preventiva", "servicio", dec!(120000)),
                ("Cable de red Cat6", "metro", dec!(890)),
            ],
        ),
    ];

    let mut catalog = Vec::with_capacity(suppliers.len());
    for (input, products) in suppliers {
        let supplier = service.create_supplier(input).await?;
        let mut created = Vec::with_capacity(products.len());
        for (name, unit, price) in products {
            created.push(
                service
                    .create_product(
                        supplier.id,
                        ProductInput {
                            product_name: name.to_string(),
                            unit_price: Some(price),
                            currency: Some(Currency::Clp),
                            unit_of_measure: Some(unit.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?,
            );
        }
        catalog.push((supplier.id, created));
    }
    Ok(catalog)
}

async fn seed_orders(
    pool: &Arc<DbPool>,
    centers: &[(i32, Currency)],
    catalog: &Catalog,
) -> anyhow::Result<usize> {
    let service = OrderService::new(pool.clone(), Currency::Clp);
    let current = Month::current();
    let months = [current.previous(), current];
    let clp_centers: Vec<i32> = centers
        .iter()
        .filter(|(_, currency)| *currency == Currency::Clp)
        .map(|(id, _)| *id)
        .collect();

    let mut created = 0;
    for (index, month) in months.iter().enumerate() {
        for (slot, (supplier_id, products)) in catalog.iter().enumerate() {
            let Some(cost_center_id) = clp_centers.get((index + slot) % clp_centers.len().max(1))
            else {
                continue;
            };
            let day = (5 + 7 * slot as u32).min(month.last_day().day());
            let order_date = month.first_day().with_day(day);

            let items = products
                .iter()
                .enumerate()
                .map(|(n, product)| OrderItemInput {
                    product_id: Some(product.id),
                    quantity: Decimal::from(n as i64 + 1 + index as i64),
                    unit_price: product.unit_price,
                    currency: Some(Currency::Clp),
                    ..Default::default()
                })
                .collect();

            let detail = service
                .create_order(CreateOrderInput {
                    supplier_id: Some(*supplier_id),
                    cost_center_id: Some(*cost_center_id),
                    currency: Some(Currency::Clp),
                    order_date,
                    notes: Some("Orden de ejemplo".to_string()),
                    items,
                    ..Default::default()
                })
                .await?;
            service.update_status(detail.order.id, "received").await?;
            created += 1;
        }
    }
    Ok(created)
}
