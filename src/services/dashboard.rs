use crate::{
    db::DbPool,
    entities::{
        purchase_order::{self, OrderStatus},
        supplier,
    },
    errors::ServiceError,
    money::{format_amount, round_money, Currency},
    period::Month,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

pub const DEFAULT_TREND_MONTHS: usize = 6;
const RECENT_ORDERS: u64 = 5;
const TOP_SUPPLIERS: usize = 10;
const UNKNOWN_SUPPLIER: &str = "Proveedor desconocido";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentOrder {
    #[serde(flatten)]
    pub order: purchase_order::Model,
    pub supplier_name: Option<String>,
    pub formatted_total_amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_orders: u64,
    /// Order totals summed per currency
    pub total_amount: BTreeMap<Currency, Decimal>,
    pub active_suppliers: u64,
    pub pending_orders: u64,
    pub status_counts: BTreeMap<String, u64>,
    pub recent_orders: Vec<RecentOrder>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
    pub count: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyOrders {
    pub month: Month,
    pub currencies: BTreeMap<Currency, TrendBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierSpending {
    pub supplier_id: Option<i32>,
    pub supplier_name: String,
    pub currency: Currency,
    pub order_count: u64,
    pub total_spent: Decimal,
    pub avg_order_amount: Decimal,
    pub formatted_total_spent: String,
    pub formatted_avg_order_amount: String,
}

/// Read-only aggregates for the control panel
#[derive(Clone)]
pub struct DashboardService {
    db_pool: Arc<DbPool>,
}

impl DashboardService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DashboardStats, ServiceError> {
        let db = &*self.db_pool;
        let orders = purchase_order::Entity::find().all(db).await?;

        let mut total_amount: BTreeMap<Currency, Decimal> = BTreeMap::new();
        let mut status_counts: BTreeMap<String, u64> = BTreeMap::new();
        for order in &orders {
            *total_amount.entry(order.currency).or_default() += order.total_amount;
            *status_counts.entry(order.status.to_string()).or_default() += 1;
        }

        let recent_orders = purchase_order::Entity::find()
            .order_by_desc(purchase_order::Column::CreatedAt)
            .order_by_desc(purchase_order::Column::Id)
            .limit(RECENT_ORDERS)
            .find_also_related(supplier::Entity)
            .all(db)
            .await?
            .into_iter()
            .map(|(order, supplier)| RecentOrder {
                supplier_name: supplier.map(|s| s.name),
                formatted_total_amount: format_amount(
                    order.total_amount,
                    order.currency.decimals(),
                ),
                order,
            })
            .collect();

        Ok(DashboardStats {
            total_orders: orders.len() as u64,
            pending_orders: status_counts
                .get(&OrderStatus::Pending.to_string())
                .copied()
                .unwrap_or(0),
            total_amount,
            active_suppliers: supplier::Entity::find().count(db).await?,
            status_counts,
            recent_orders,
        })
    }

    /// Order count and total per currency for each of the last `months`
    /// months, oldest first. Months without orders are included.
    #[instrument(skip(self))]
    pub async fn orders_trend(&self, months: usize) -> Result<Vec<MonthlyOrders>, ServiceError> {
        if months == 0 || months > 24 {
            return Err(ServiceError::ValidationError(
                "months must be between 1 and 24".to_string(),
            ));
        }
        let window = Month::current().trailing(months);
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return Ok(vec![]);
        };

        let orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::OrderDate.between(first.first_day(), last.last_day()))
            .all(&*self.db_pool)
            .await?;

        let mut buckets: HashMap<Month, BTreeMap<Currency, TrendBucket>> = HashMap::new();
        for order in orders {
            let bucket = buckets
                .entry(Month::from_date(order.order_date))
                .or_default()
                .entry(order.currency)
                .or_default();
            bucket.count += 1;
            bucket.total += order.total_amount;
        }

        Ok(window
            .into_iter()
            .map(|month| MonthlyOrders {
                currencies: buckets.remove(&month).unwrap_or_default(),
                month,
            })
            .collect())
    }

    /// Top suppliers by spend per currency; cancelled orders are ignored.
    #[instrument(skip(self))]
    pub async fn spending_summary(&self) -> Result<Vec<SupplierSpending>, ServiceError> {
        let orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::Status.ne(OrderStatus::Cancelled))
            .find_also_related(supplier::Entity)
            .all(&*self.db_pool)
            .await?;

        let mut grouped: HashMap<(Option<i32>, Currency), (Option<String>, u64, Decimal)> =
            HashMap::new();
        for (order, supplier) in orders {
            let entry = grouped
                .entry((order.supplier_id, order.currency))
                .or_insert_with(|| (supplier.map(|s| s.name), 0, Decimal::ZERO));
            entry.1 += 1;
            entry.2 += order.total_amount;
        }

        let mut summary: Vec<SupplierSpending> = grouped
            .into_iter()
            .map(|((supplier_id, currency), (name, count, total))| {
                let avg = round_money(total / Decimal::from(count.max(1)));
                SupplierSpending {
                    supplier_id,
                    supplier_name: name.unwrap_or_else(|| UNKNOWN_SUPPLIER.to_string()),
                    currency,
                    order_count: count,
                    total_spent: total,
                    avg_order_amount: avg,
                    formatted_total_spent: format_amount(total, currency.decimals()),
                    formatted_avg_order_amount: format_amount(avg, currency.decimals()),
                }
            })
            .collect();

        summary.sort_by(|a, b| {
            b.total_spent
                .cmp(&a.total_spent)
                .then_with(|| a.supplier_name.cmp(&b.supplier_name))
        });
        summary.truncate(TOP_SUPPLIERS);
        Ok(summary)
    }
}
