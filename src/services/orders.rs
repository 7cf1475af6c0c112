use crate::{
    common::empty_string_as_none,
    db::DbPool,
    entities::{
        cost_center,
        purchase_order::{self, OrderStatus},
        purchase_order_item, supplier, supplier_product,
    },
    errors::ServiceError,
    listing::{FieldValue, Listable},
    metrics,
    money::{apply_vat, checked_sum, format_money, line_amount, round_money, Currency},
    period::Month,
    services::{
        sequences::{self, next_value, retry_on_conflict, MAX_ALLOCATION_ATTEMPTS},
        suppliers::find_supplier,
    },
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub product_id: Option<i32>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub product_code: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Defaults to the order currency
    pub currency: Option<Currency>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub unit_of_measure: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub supplier_id: Option<i32>,
    pub cost_center_id: Option<i32>,
    pub currency: Option<Currency>,
    /// Defaults to today
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    /// Defaults to the supplier's payment terms
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub payment_terms: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub billing_address: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateOrderStatusInput {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

/// Order list row with supplier and cost center names resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRow {
    #[serde(flatten)]
    pub order: purchase_order::Model,
    pub supplier_name: Option<String>,
    pub contact_person: Option<String>,
    pub cost_center_code: Option<String>,
    pub cost_center_name: Option<String>,
    pub items_count: u64,
    pub formatted_total_amount: String,
}

impl Listable for OrderRow {
    const RESOURCE: &'static str = "orders";
    const FILTERS: &'static [&'static str] = &["status", "currency", "cost_center_id", "month"];
    const SORT_FIELDS: &'static [&'static str] = &[
        "order_number",
        "supplier_name",
        "cost_center_name",
        "order_date",
        "delivery_date",
        "total_amount",
        "status",
        "created_at",
    ];

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.order.order_number.as_str()),
            self.supplier_name.as_deref(),
            self.cost_center_name.as_deref(),
            self.cost_center_code.as_deref(),
            self.order.notes.as_deref(),
        ]
    }

    fn filter_value(&self, key: &str) -> Option<String> {
        match key {
            "status" => Some(self.order.status.to_string()),
            "currency" => Some(self.order.currency.to_string()),
            "cost_center_id" => Some(self.order.cost_center_id.to_string()),
            "month" => Some(Month::from_date(self.order.order_date).to_string()),
            _ => None,
        }
    }

    fn sort_value(&self, field: &str) -> Option<FieldValue> {
        let o = &self.order;
        match field {
            "order_number" => Some(o.order_number.as_str().into()),
            "supplier_name" => self.supplier_name.as_deref().map(FieldValue::from),
            "cost_center_name" => self.cost_center_name.as_deref().map(FieldValue::from),
            "order_date" => Some(o.order_date.into()),
            "delivery_date" => o.delivery_date.map(FieldValue::from),
            "total_amount" => Some(o.total_amount.into()),
            "status" => Some(o.status.to_string().as_str().into()),
            "created_at" => Some(FieldValue::Date(o.created_at.date_naive())),
            _ => None,
        }
    }
}

/// An order with everything needed to show or print it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: purchase_order::Model,
    pub supplier: Option<supplier::Model>,
    pub cost_center: Option<cost_center::Model>,
    pub items: Vec<purchase_order_item::Model>,
}

/// A validated order line with its product snapshot resolved.
#[derive(Debug, Clone)]
struct PreparedLine {
    product_id: Option<i32>,
    product_name: String,
    product_code: Option<String>,
    description: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    unit_of_measure: Option<String>,
    amount: Decimal,
}

/// Three-letter order prefix from the initials of the supplier name.
///
/// Non-ASCII letters and symbols are dropped first; short results are padded
/// with `X`, e.g. "Acme Industrial Ltda" gives `AIL` and "Sodimac" gives `SXX`.
pub fn supplier_initials(name: &str) -> String {
    let letters: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .collect();
    let mut code: String = letters
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    while code.len() < 3 {
        code.push('X');
    }
    code
}

pub fn format_order_number(initials: &str, year: i32, seq: i32) -> String {
    format!("{}-{}-{:04}", initials, year, seq)
}

/// Service for purchase orders
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    default_currency: Currency,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, default_currency: Currency) -> Self {
        Self {
            db_pool,
            default_currency,
        }
    }

    /// Every order, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderRow>, ServiceError> {
        let db = &*self.db_pool;
        let orders = purchase_order::Entity::find()
            .order_by_desc(purchase_order::Column::CreatedAt)
            .order_by_desc(purchase_order::Column::Id)
            .find_also_related(supplier::Entity)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list purchase orders");
                ServiceError::DatabaseError(e)
            })?;

        let centers: HashMap<i32, cost_center::Model> = cost_center::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|cc| (cc.id, cc))
            .collect();

        let item_counts: HashMap<i32, i64> = purchase_order_item::Entity::find()
            .select_only()
            .column(purchase_order_item::Column::OrderId)
            .column_as(Expr::col(purchase_order_item::Column::Id).count(), "items_count")
            .group_by(purchase_order_item::Column::OrderId)
            .into_tuple::<(i32, i64)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        Ok(orders
            .into_iter()
            .map(|(order, supplier)| {
                let center = centers.get(&order.cost_center_id);
                OrderRow {
                    supplier_name: supplier.as_ref().map(|s| s.name.clone()),
                    contact_person: supplier.and_then(|s| s.contact_person),
                    cost_center_code: center.map(|c| c.code.clone()),
                    cost_center_name: center.map(|c| c.name.clone()),
                    items_count: item_counts.get(&order.id).copied().unwrap_or(0).max(0) as u64,
                    formatted_total_amount: format_money(order.total_amount, order.currency),
                    order,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: i32) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let (order, supplier) = purchase_order::Entity::find_by_id(id)
            .find_also_related(supplier::Entity)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;

        let cost_center = cost_center::Entity::find_by_id(order.cost_center_id)
            .one(db)
            .await?;
        let items = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::OrderId.eq(id))
            .order_by_asc(purchase_order_item::Column::Id)
            .all(db)
            .await?;

        Ok(OrderDetail {
            order,
            supplier,
            cost_center,
            items,
        })
    }

    /// Validates and stores a new order with its items.
    ///
    /// Nothing is written unless every precondition holds: a supplier, at
    /// least one item, an active cost center, and one currency for all items.
    #[instrument(skip(self, input), fields(supplier_id = ?input.supplier_id))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;

        let supplier_id = input
            .supplier_id
            .ok_or_else(|| ServiceError::ValidationError("supplier_id is required".to_string()))?;
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one item".to_string(),
            ));
        }
        let cost_center_id = input.cost_center_id.ok_or_else(|| {
            ServiceError::ValidationError(
                "Every order must be linked to a cost center (cost_center_id)".to_string(),
            )
        })?;

        let cost_center = cost_center::Entity::find_by_id(cost_center_id)
            .one(db)
            .await?
            .filter(|cc| cc.is_active)
            .ok_or_else(|| {
                ServiceError::ValidationError("Cost center is invalid or inactive".to_string())
            })?;

        let currency = input.currency.unwrap_or(self.default_currency);
        if input
            .items
            .iter()
            .any(|item| item.currency.unwrap_or(currency) != currency)
        {
            return Err(ServiceError::ValidationError(format!(
                "All items must use the order currency ({})",
                currency
            )));
        }

        let supplier = find_supplier(db, supplier_id).await?;
        let lines = prepare_lines(db, &input.items).await?;

        let subtotal = checked_sum(lines.iter().map(|line| line.amount))
            .map(round_money)
            .ok_or_else(|| {
                ServiceError::ValidationError("Order subtotal is too large".to_string())
            })?;
        let (tax_amount, total_amount) = apply_vat(subtotal);
        let order_date = input.order_date.unwrap_or_else(|| Utc::now().date_naive());

        let draft = purchase_order::ActiveModel {
            supplier_id: Set(Some(supplier.id)),
            cost_center_id: Set(cost_center.id),
            currency: Set(currency),
            order_date: Set(order_date),
            delivery_date: Set(input.delivery_date),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            tax_amount: Set(tax_amount),
            total_amount: Set(total_amount),
            payment_terms: Set(input.payment_terms.or_else(|| supplier.payment_terms.clone())),
            notes: Set(input.notes),
            billing_address: Set(input.billing_address),
            shipping_address: Set(input.shipping_address),
            ..Default::default()
        };

        let (service, supplier_ref, draft_ref, lines_ref) = (self, &supplier, &draft, &lines);
        let (order, items) = retry_on_conflict("order number", move || async move {
            service
                .insert_order(supplier_ref, order_date.year(), draft_ref.clone(), lines_ref)
                .await
        })
        .await?;

        metrics::record_order_created();
        info!(
            order_id = order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Purchase order created"
        );

        Ok(OrderDetail {
            order,
            supplier: Some(supplier),
            cost_center: Some(cost_center),
            items,
        })
    }

    async fn insert_order(
        &self,
        supplier: &supplier::Model,
        year: i32,
        mut draft: purchase_order::ActiveModel,
        lines: &[PreparedLine],
    ) -> Result<(purchase_order::Model, Vec<purchase_order_item::Model>), ServiceError> {
        let txn = self.db_pool.begin().await?;

        let scope = sequences::order_scope(supplier.id, year);
        let initials = supplier_initials(&supplier.name);

        let mut number = None;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let seq = next_value(&txn, &scope, count_orders_in_year(&txn, supplier.id, year)).await?;
            let candidate = format_order_number(&initials, year, seq);
            if !order_number_exists(&txn, &candidate).await? {
                number = Some(candidate);
                break;
            }
        }
        let number = number.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "Could not allocate a free order number for supplier {}",
                supplier.id
            ))
        })?;

        draft.order_number = Set(number);
        let order = draft.insert(&txn).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = purchase_order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                product_code: Set(line.product_code.clone()),
                description: Set(line.description.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(round_money(line.amount)),
                unit_of_measure: Set(line.unit_of_measure.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;
        Ok((order, items))
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i32,
        status: &str,
    ) -> Result<purchase_order::Model, ServiceError> {
        let status = OrderStatus::from_str(status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Invalid status '{}'; expected pending, approved, sent, received or cancelled",
                status
            ))
        })?;

        let db = &*self.db_pool;
        let order = purchase_order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(status);
        let updated = active.update(db).await?;
        info!(order_id = id, status = %status, "Order status updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;
        purchase_order_item::Entity::delete_many()
            .filter(purchase_order_item::Column::OrderId.eq(id))
            .exec(&txn)
            .await?;
        let result = purchase_order::Entity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Order", id));
        }
        txn.commit().await?;
        info!(order_id = id, "Order deleted");
        Ok(())
    }
}

async fn prepare_lines<C: ConnectionTrait>(
    conn: &C,
    items: &[OrderItemInput],
) -> Result<Vec<PreparedLine>, ServiceError> {
    let mut lines = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let position = idx + 1;
        if item.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Item {}: quantity must be greater than zero",
                position
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Item {}: unit_price cannot be negative",
                position
            )));
        }
        let amount = line_amount(item.quantity, item.unit_price).ok_or_else(|| {
            ServiceError::ValidationError(format!("Item {}: line amount is too large", position))
        })?;

        let product = match item.product_id {
            Some(product_id) => Some(
                supplier_product::Entity::find_by_id(product_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Item {}: product {} does not exist",
                            position, product_id
                        ))
                    })?,
            ),
            None => None,
        };

        let product_name = item
            .product_name
            .clone()
            .or_else(|| product.as_ref().map(|p| p.product_name.clone()))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Item {}: product_name is required",
                    position
                ))
            })?;

        lines.push(PreparedLine {
            product_id: item.product_id,
            product_name,
            product_code: item
                .product_code
                .clone()
                .or_else(|| product.as_ref().map(|p| p.product_code.clone())),
            description: item
                .description
                .clone()
                .or_else(|| product.as_ref().and_then(|p| p.description.clone())),
            quantity: item.quantity,
            unit_price: item.unit_price,
            unit_of_measure: item
                .unit_of_measure
                .clone()
                .or_else(|| product.as_ref().and_then(|p| p.unit_of_measure.clone())),
            amount,
        });
    }
    Ok(lines)
}

async fn count_orders_in_year<C: ConnectionTrait>(
    conn: &C,
    supplier_id: i32,
    year: i32,
) -> Result<i32, DbErr> {
    let (start, end) = match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(DbErr::Custom(format!("year {} is out of range", year))),
    };
    let count = purchase_order::Entity::find()
        .filter(purchase_order::Column::SupplierId.eq(supplier_id))
        .filter(purchase_order::Column::OrderDate.between(start, end))
        .count(conn)
        .await?;
    Ok(i32::try_from(count).unwrap_or(i32::MAX))
}

async fn order_number_exists<C: ConnectionTrait>(conn: &C, number: &str) -> Result<bool, DbErr> {
    let count = purchase_order::Entity::find()
        .filter(purchase_order::Column::OrderNumber.eq(number))
        .count(conn)
        .await?;
    Ok(count > 0)
}
