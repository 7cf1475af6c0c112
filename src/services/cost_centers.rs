use crate::{
    common::{empty_string_as_none, utilization},
    db::DbPool,
    entities::{budget, cost_center, purchase_order},
    errors::ServiceError,
    listing::{FieldValue, Listable},
    money::Currency,
    period::Month,
};
use chrono::NaiveDate;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

/// Utilization percent above which usage is `warning` when a budget sets none.
pub const DEFAULT_WARNING_THRESHOLD: Decimal = Decimal::from_parts(80, 0, 0, false, 0);
/// Utilization percent above which usage is `critical` when a budget sets none.
pub const DEFAULT_CRITICAL_THRESHOLD: Decimal = Decimal::from_parts(95, 0, 0, false, 0);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UsageStatus {
    Normal,
    Warning,
    Critical,
    Exceeded,
}

/// Classifies a utilization percentage. Every boundary is exclusive, so
/// exactly 80 is still `normal` and exactly 100 is `critical`.
pub fn classify_usage(utilization: f64, warning: f64, critical: f64) -> UsageStatus {
    if utilization > 100.0 {
        UsageStatus::Exceeded
    } else if utilization > critical {
        UsageStatus::Critical
    } else if utilization > warning {
        UsageStatus::Warning
    } else {
        UsageStatus::Normal
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CostCenterInput {
    #[validate(length(min = 1, max = 32, message = "code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub owner: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "empty_string_as_none")]
    pub center_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub manager: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub department: Option<String>,
    pub currency: Option<Currency>,
    pub approval_limit: Option<Decimal>,
    pub requires_approval: Option<bool>,
    pub is_active: Option<bool>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CostCenterUpdate {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub owner: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "empty_string_as_none")]
    pub center_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub manager: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub department: Option<String>,
    pub currency: Option<Currency>,
    pub approval_limit: Option<Decimal>,
    pub requires_approval: Option<bool>,
    pub is_active: Option<bool>,
}

impl Listable for cost_center::Model {
    const RESOURCE: &'static str = "cost centers";
    const FILTERS: &'static [&'static str] = &["is_active", "department", "currency"];
    const SORT_FIELDS: &'static [&'static str] = &[
        "code",
        "name",
        "department",
        "manager",
        "currency",
        "approval_limit",
        "is_active",
        "created_at",
    ];

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.code.as_str()),
            Some(self.name.as_str()),
            self.description.as_deref(),
            self.manager.as_deref(),
            self.department.as_deref(),
        ]
    }

    fn filter_value(&self, key: &str) -> Option<String> {
        match key {
            "is_active" => Some(self.is_active.to_string()),
            "department" => self.department.clone(),
            "currency" => Some(self.currency.to_string()),
            _ => None,
        }
    }

    fn sort_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "code" => Some(self.code.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            "department" => self.department.as_deref().map(FieldValue::from),
            "manager" => self.manager.as_deref().map(FieldValue::from),
            "currency" => Some(self.currency.code().into()),
            "approval_limit" => self.approval_limit.map(FieldValue::from),
            "is_active" => Some(self.is_active.into()),
            "created_at" => Some(FieldValue::Date(self.created_at.date_naive())),
            _ => None,
        }
    }
}

/// Budget consumption of one cost center in one currency for one month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRow {
    pub budget_id: i32,
    pub cost_center_id: i32,
    pub cost_center_code: String,
    pub cost_center_name: String,
    pub month: Month,
    pub currency: Currency,
    pub budget: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
    pub utilization: f64,
    pub status: UsageStatus,
    pub warning_threshold: Decimal,
    pub critical_threshold: Decimal,
    pub overspend_limit: Option<Decimal>,
    pub over_limit: bool,
    pub orders_count: u64,
}

impl UsageRow {
    /// Applies the budget's own thresholds, falling back to 80 / 95.
    pub fn compute(
        budget: &budget::Model,
        center: &cost_center::Model,
        month: Month,
        spend: Spend,
    ) -> Self {
        let warning = budget.warning_threshold.unwrap_or(DEFAULT_WARNING_THRESHOLD);
        let critical = budget
            .critical_threshold
            .unwrap_or(DEFAULT_CRITICAL_THRESHOLD);
        let pct = utilization(spend.total, budget.amount);
        let over_limit = budget.overspend_limit.is_some_and(|limit| {
            pct > 100.0 + limit.to_f64().unwrap_or(0.0)
        });

        Self {
            budget_id: budget.id,
            cost_center_id: center.id,
            cost_center_code: center.code.clone(),
            cost_center_name: center.name.clone(),
            month,
            currency: budget.currency,
            budget: budget.amount,
            spent: spend.total,
            remaining: budget.amount - spend.total,
            utilization: pct,
            status: classify_usage(
                pct,
                warning.to_f64().unwrap_or(80.0),
                critical.to_f64().unwrap_or(95.0),
            ),
            warning_threshold: warning,
            critical_threshold: critical,
            overspend_limit: budget.overspend_limit,
            over_limit,
            orders_count: spend.orders,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CenterMetrics {
    #[serde(flatten)]
    pub cost_center: cost_center::Model,
    pub budget_amount: Decimal,
    pub total_spent: Decimal,
    pub orders_count: u64,
    pub utilization_percentage: f64,
    pub remaining_budget: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyTotals {
    pub currency: Currency,
    pub total_budget: Decimal,
    pub total_spent: Decimal,
    pub avg_utilization: f64,
    pub available: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_centers: usize,
    pub active_centers: usize,
    pub over_budget_centers: usize,
    /// Amounts are only summed within one currency
    pub by_currency: Vec<CurrencyTotals>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCenterMetrics {
    pub period: Month,
    pub metrics: MetricsSummary,
    pub centers: Vec<CenterMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodPerformance {
    pub period: Month,
    pub currency: Currency,
    pub budget: Decimal,
    pub spent: Decimal,
    pub utilization: f64,
    pub orders_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CenterPerformance {
    pub center_code: String,
    pub center_name: String,
    pub periods: Vec<PeriodPerformance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub periods: Vec<Month>,
    pub centers: Vec<CenterPerformance>,
}

/// Order totals charged to one cost center.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spend {
    pub total: Decimal,
    pub orders: u64,
}

impl Spend {
    /// Counts one more order; `None` when the total would overflow.
    fn record(&mut self, amount: Decimal) -> Option<()> {
        self.total = self.total.checked_add(amount)?;
        self.orders += 1;
        Some(())
    }
}

pub type SpendKey = (i32, Month, Currency);

/// Sums order totals per cost center, month and currency for orders dated
/// between `first` and `last` inclusive.
pub(crate) async fn spending_by_center<C: ConnectionTrait>(
    conn: &C,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<HashMap<SpendKey, Spend>, ServiceError> {
    let orders = purchase_order::Entity::find()
        .filter(purchase_order::Column::OrderDate.between(first, last))
        .all(conn)
        .await?;

    let mut spend: HashMap<SpendKey, Spend> = HashMap::new();
    for order in orders {
        let entry = spend
            .entry((
                order.cost_center_id,
                Month::from_date(order.order_date),
                order.currency,
            ))
            .or_default();
        entry.record(order.total_amount).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Spending of cost center {} overflows",
                order.cost_center_id
            ))
        })?;
    }
    Ok(spend)
}

/// Service for cost centers and their budget consumption
#[derive(Clone)]
pub struct CostCenterService {
    db_pool: Arc<DbPool>,
    default_currency: Currency,
}

impl CostCenterService {
    pub fn new(db_pool: Arc<DbPool>, default_currency: Currency) -> Self {
        Self {
            db_pool,
            default_currency,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_cost_centers(&self) -> Result<Vec<cost_center::Model>, ServiceError> {
        cost_center::Entity::find()
            .order_by_asc(cost_center::Column::Code)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list cost centers");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_cost_center(&self, id: i32) -> Result<cost_center::Model, ServiceError> {
        find_cost_center(&*self.db_pool, id).await
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_cost_center(
        &self,
        input: CostCenterInput,
    ) -> Result<cost_center::Model, ServiceError> {
        let code = required_text(&input.code, "code")?;
        let name = required_text(&input.name, "name")?;

        let created = cost_center::ActiveModel {
            code: Set(code),
            name: Set(name),
            description: Set(input.description),
            owner: Set(input.owner),
            is_active: Set(input.is_active.unwrap_or(true)),
            center_type: Set(input.center_type),
            manager: Set(input.manager),
            email: Set(input.email),
            department: Set(input.department),
            currency: Set(input.currency.unwrap_or(self.default_currency)),
            approval_limit: Set(input.approval_limit),
            requires_approval: Set(input.requires_approval.unwrap_or(false)),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(cost_center_id = created.id, code = %created.code, "Cost center created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_cost_center(
        &self,
        id: i32,
        input: CostCenterUpdate,
    ) -> Result<cost_center::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = find_cost_center(db, id).await?;
        let mut active: cost_center::ActiveModel = existing.into();

        if let Some(code) = input.code {
            active.code = Set(required_text(&code, "code")?);
        }
        if let Some(name) = input.name {
            active.name = Set(required_text(&name, "name")?);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(owner) = input.owner {
            active.owner = Set(Some(owner));
        }
        if let Some(center_type) = input.center_type {
            active.center_type = Set(Some(center_type));
        }
        if let Some(manager) = input.manager {
            active.manager = Set(Some(manager));
        }
        if let Some(email) = input.email {
            active.email = Set(Some(email));
        }
        if let Some(department) = input.department {
            active.department = Set(Some(department));
        }
        if let Some(currency) = input.currency {
            active.currency = Set(currency);
        }
        if let Some(limit) = input.approval_limit {
            active.approval_limit = Set(Some(limit));
        }
        if let Some(requires_approval) = input.requires_approval {
            active.requires_approval = Set(requires_approval);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(db).await?;
        info!(cost_center_id = id, "Cost center updated");
        Ok(updated)
    }

    /// Flips `is_active`; calling it twice reactivates the cost center.
    #[instrument(skip(self))]
    pub async fn toggle_active(&self, id: i32) -> Result<cost_center::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = find_cost_center(db, id).await?;
        let is_active = !existing.is_active;
        let mut active: cost_center::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(db).await?;
        info!(cost_center_id = id, is_active, "Cost center active flag toggled");
        Ok(updated)
    }

    /// Budget consumption for every budget row of `month`.
    #[instrument(skip(self))]
    pub async fn usage(
        &self,
        month: Month,
        cost_center_id: Option<i32>,
        currency: Option<Currency>,
    ) -> Result<Vec<UsageRow>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = budget::Entity::find()
            .filter(budget::Column::Month.eq(month.to_string()))
            .find_also_related(cost_center::Entity)
            .order_by_asc(cost_center::Column::Name)
            .order_by_asc(budget::Column::Currency);
        if let Some(id) = cost_center_id {
            query = query.filter(budget::Column::CostCenterId.eq(id));
        }
        if let Some(currency) = currency {
            query = query.filter(budget::Column::Currency.eq(currency));
        }
        let budgets = query.all(db).await?;
        let spend = spending_by_center(db, month.first_day(), month.last_day()).await?;

        Ok(budgets
            .into_iter()
            .filter_map(|(budget, center)| {
                let center = center?;
                let spent = spend
                    .get(&(center.id, month, budget.currency))
                    .copied()
                    .unwrap_or_default();
                Some(UsageRow::compute(&budget, &center, month, spent))
            })
            .collect())
    }

    /// Per-center budget and spend for `period` in each center's own currency.
    #[instrument(skip(self))]
    pub async fn metrics(&self, period: Month) -> Result<CostCenterMetrics, ServiceError> {
        let db = &*self.db_pool;
        let mut centers = cost_center::Entity::find().all(db).await?;
        centers.sort_by(|a, b| {
            b.is_active
                .cmp(&a.is_active)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        let budgets: HashMap<(i32, Currency), Decimal> = budget::Entity::find()
            .filter(budget::Column::Month.eq(period.to_string()))
            .all(db)
            .await?
            .into_iter()
            .map(|b| ((b.cost_center_id, b.currency), b.amount))
            .collect();
        let spend = spending_by_center(db, period.first_day(), period.last_day()).await?;

        let rows: Vec<CenterMetrics> = centers
            .into_iter()
            .map(|center| {
                let budget_amount = budgets
                    .get(&(center.id, center.currency))
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                let spent = spend
                    .get(&(center.id, period, center.currency))
                    .copied()
                    .unwrap_or_default();
                let orders_count = spend
                    .iter()
                    .filter(|((id, month, _), _)| *id == center.id && *month == period)
                    .map(|(_, s)| s.orders)
                    .sum();
                CenterMetrics {
                    budget_amount,
                    total_spent: spent.total,
                    orders_count,
                    utilization_percentage: utilization(spent.total, budget_amount),
                    remaining_budget: budget_amount - spent.total,
                    cost_center: center,
                }
            })
            .collect();

        let mut by_currency: BTreeMap<Currency, (Decimal, Decimal)> = BTreeMap::new();
        for row in &rows {
            let totals = by_currency.entry(row.cost_center.currency).or_default();
            totals.0 += row.budget_amount;
            totals.1 += row.total_spent;
        }

        let metrics = MetricsSummary {
            total_centers: rows.len(),
            active_centers: rows.iter().filter(|r| r.cost_center.is_active).count(),
            over_budget_centers: rows
                .iter()
                .filter(|r| r.utilization_percentage > 100.0)
                .count(),
            by_currency: by_currency
                .into_iter()
                .map(|(currency, (budget, spent))| CurrencyTotals {
                    currency,
                    total_budget: budget,
                    total_spent: spent,
                    avg_utilization: utilization(spent, budget),
                    available: budget - spent,
                })
                .collect(),
        };

        Ok(CostCenterMetrics {
            period,
            metrics,
            centers: rows,
        })
    }

    /// Budget against spend for each budgeted center across `periods`.
    #[instrument(skip(self))]
    pub async fn performance_comparison(
        &self,
        periods: Vec<Month>,
    ) -> Result<PerformanceComparison, ServiceError> {
        if periods.is_empty() {
            return Err(ServiceError::ValidationError(
                "periods is required (comma separated YYYY-MM values)".to_string(),
            ));
        }
        let db = &*self.db_pool;
        let (first, last) = match (periods.iter().min(), periods.iter().max()) {
            (Some(first), Some(last)) => (first.first_day(), last.last_day()),
            _ => return Ok(PerformanceComparison { periods, centers: vec![] }),
        };

        let labels: Vec<String> = periods.iter().map(Month::to_string).collect();
        let budgets = budget::Entity::find()
            .filter(budget::Column::Month.is_in(labels))
            .find_also_related(cost_center::Entity)
            .all(db)
            .await?;
        let spend = spending_by_center(db, first, last).await?;

        let mut grouped: BTreeMap<(String, String), Vec<PeriodPerformance>> = BTreeMap::new();
        for (budget, center) in budgets {
            let (Some(center), Ok(period)) = (center, budget.month.parse::<Month>()) else {
                continue;
            };
            let spent = spend
                .get(&(center.id, period, budget.currency))
                .copied()
                .unwrap_or_default();
            grouped
                .entry((center.name.clone(), center.code.clone()))
                .or_default()
                .push(PeriodPerformance {
                    period,
                    currency: budget.currency,
                    budget: budget.amount,
                    spent: spent.total,
                    utilization: utilization(spent.total, budget.amount),
                    orders_count: spent.orders,
                });
        }

        let centers = grouped
            .into_iter()
            .map(|((center_name, center_code), mut periods)| {
                periods.sort_by(|a, b| a.period.cmp(&b.period).then(a.currency.cmp(&b.currency)));
                CenterPerformance {
                    center_code,
                    center_name,
                    periods,
                }
            })
            .collect();

        Ok(PerformanceComparison { periods, centers })
    }
}

fn required_text(raw: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn find_cost_center<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<cost_center::Model, ServiceError> {
    cost_center::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cost center", id))
}
