use crate::{
    common::{empty_string_as_none, month_or_current, parse_month, utilization},
    db::DbPool,
    entities::{budget, cost_center},
    errors::{RowError, ServiceError},
    listing::{FieldValue, Listable},
    money::{round_money, Currency, MAX_AMOUNT},
    period::Month,
    services::cost_centers::spending_by_center,
};
use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

pub const DEFAULT_TREND_MONTHS: usize = 6;
pub const MAX_TREND_MONTHS: usize = 24;

const CSV_HEADERS: [&str; 13] = [
    "ID",
    "Cost Center Code",
    "Cost Center Name",
    "Month",
    "Currency",
    "Amount",
    "Spent",
    "Remaining",
    "Utilization %",
    "Category",
    "Priority",
    "Approver",
    "Description",
];

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Budget fields as submitted by forms. Creation requires `cost_center_id`,
/// `month` and `amount`; updates only touch the fields present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BudgetInput {
    pub cost_center_id: Option<i32>,
    #[serde(default, alias = "period", deserialize_with = "empty_string_as_none")]
    pub month: Option<String>,
    pub currency: Option<Currency>,
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub approver: Option<String>,
    pub warning_threshold: Option<Decimal>,
    pub critical_threshold: Option<Decimal>,
    pub overspend_limit: Option<Decimal>,
    pub auto_adjust: Option<bool>,
    pub rollover_unused: Option<bool>,
    pub require_approval: Option<bool>,
    pub email_alerts: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateBudgetInput {
    #[serde(alias = "target_period")]
    pub target_month: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertBudgetInput {
    pub cost_center_id: Option<i32>,
    #[serde(default, alias = "period")]
    pub month: Option<String>,
    pub currency: Option<Currency>,
    pub amount: Option<Decimal>,
}

/// Identifies one budget by its unique key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetKeyQuery {
    pub cost_center_id: Option<i32>,
    #[serde(default, alias = "period")]
    pub month: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendQuery {
    pub months: Option<usize>,
    pub until: Option<String>,
    pub cost_center_id: Option<i32>,
    pub currency: Option<Currency>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportQuery {
    #[serde(default, alias = "period")]
    pub month: Option<String>,
    pub currency: Option<Currency>,
}

/// One row of a budget import. The cost center is given by id or code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetImportRow {
    pub cost_center_id: Option<i32>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub cost_center_code: Option<String>,
    #[serde(default, alias = "period")]
    pub month: Option<String>,
    pub currency: Option<Currency>,
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetImportRequest {
    pub rows: Vec<BudgetImportRow>,
    /// Update the amount of existing budgets instead of rejecting the row
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    SetAmount { amount: Decimal },
    AdjustPercent { percent: Decimal },
    AdjustAmount { delta: Decimal },
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    pub ids: Vec<i32>,
    #[serde(flatten)]
    pub action: BulkAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateSummary {
    pub affected: usize,
}

/// Budget with its cost center's code and name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRow {
    #[serde(flatten)]
    pub budget: budget::Model,
    pub cost_center_code: Option<String>,
    pub cost_center_name: Option<String>,
}

impl Listable for BudgetRow {
    const RESOURCE: &'static str = "budgets";
    const FILTERS: &'static [&'static str] = &["cost_center_id", "currency", "month"];
    const SORT_FIELDS: &'static [&'static str] = &[
        "month",
        "cost_center_code",
        "cost_center_name",
        "currency",
        "amount",
        "category",
        "priority",
        "created_at",
    ];

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            self.cost_center_code.as_deref(),
            self.cost_center_name.as_deref(),
            self.budget.category.as_deref(),
            self.budget.description.as_deref(),
            self.budget.approver.as_deref(),
        ]
    }

    fn filter_value(&self, key: &str) -> Option<String> {
        match key {
            "cost_center_id" => Some(self.budget.cost_center_id.to_string()),
            "currency" => Some(self.budget.currency.to_string()),
            "month" => Some(self.budget.month.clone()),
            _ => None,
        }
    }

    fn sort_value(&self, field: &str) -> Option<FieldValue> {
        let b = &self.budget;
        match field {
            "month" => Some(b.month.as_str().into()),
            "cost_center_code" => self.cost_center_code.as_deref().map(FieldValue::from),
            "cost_center_name" => self.cost_center_name.as_deref().map(FieldValue::from),
            "currency" => Some(b.currency.code().into()),
            "amount" => Some(b.amount.into()),
            "category" => b.category.as_deref().map(FieldValue::from),
            "priority" => b.priority.as_deref().map(FieldValue::from),
            "created_at" => Some(FieldValue::Date(b.created_at.date_naive())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub month: Month,
    pub budget: Decimal,
    pub spent: Decimal,
    pub utilization: f64,
}

/// Spending history and projection for one cost center in one currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetTrend {
    pub cost_center_id: i32,
    pub cost_center_code: String,
    pub cost_center_name: String,
    pub currency: Currency,
    pub points: Vec<TrendPoint>,
    /// Percent change of the recent half's average spend over the older half's
    pub trend_percent: f64,
    pub projected_spend: Decimal,
    pub last_budget: Decimal,
    pub risk: RiskLevel,
}

/// Percent change between the average spend of the older and the recent
/// half of `spent` (oldest first). An odd middle value belongs to neither.
pub fn trend_percent(spent: &[Decimal]) -> f64 {
    let half = spent.len() / 2;
    if half == 0 {
        return 0.0;
    }
    let average = |values: &[Decimal]| {
        values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
    };
    let older = average(&spent[..half]);
    let recent = average(&spent[spent.len() - half..]);
    if older.is_zero() {
        return if recent.is_zero() { 0.0 } else { 100.0 };
    }
    ((recent - older) / older * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0)
}

/// Next month's expected spend: the mean of the observed months.
pub fn project_spend(spent: &[Decimal]) -> Decimal {
    if spent.is_empty() {
        return Decimal::ZERO;
    }
    round_money(spent.iter().copied().sum::<Decimal>() / Decimal::from(spent.len() as u64))
}

/// `high` when the projection exceeds the last budget, `medium` above 90% of it.
pub fn classify_risk(projected: Decimal, last_budget: Decimal) -> RiskLevel {
    if projected > last_budget {
        RiskLevel::High
    } else if projected > last_budget * Decimal::new(9, 1) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Service for monthly budgets
#[derive(Clone)]
pub struct BudgetService {
    db_pool: Arc<DbPool>,
    default_currency: Currency,
}

impl BudgetService {
    pub fn new(db_pool: Arc<DbPool>, default_currency: Currency) -> Self {
        Self {
            db_pool,
            default_currency,
        }
    }

    /// Every budget, latest month first then by cost center name
    #[instrument(skip(self))]
    pub async fn list_budgets(&self) -> Result<Vec<BudgetRow>, ServiceError> {
        let rows = budget::Entity::find()
            .find_also_related(cost_center::Entity)
            .order_by_desc(budget::Column::Month)
            .order_by_asc(cost_center::Column::Name)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list budgets");
                ServiceError::DatabaseError(e)
            })?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_budget(&self, id: i32) -> Result<BudgetRow, ServiceError> {
        budget::Entity::find_by_id(id)
            .find_also_related(cost_center::Entity)
            .one(&*self.db_pool)
            .await?
            .map(to_row)
            .ok_or_else(|| ServiceError::not_found("Budget", id))
    }

    #[instrument(skip(self, input))]
    pub async fn create_budget(&self, input: BudgetInput) -> Result<budget::Model, ServiceError> {
        let (Some(cost_center_id), Some(month), Some(amount)) =
            (input.cost_center_id, input.month.as_deref(), input.amount)
        else {
            return Err(ServiceError::ValidationError(
                "cost_center_id, month/period and amount are required".to_string(),
            ));
        };
        let month = parse_month("month", month)?;
        check_amount(amount)?;
        check_thresholds(input.warning_threshold, input.critical_threshold)?;
        let db = &*self.db_pool;
        ensure_cost_center(db, cost_center_id).await?;

        let created = budget::ActiveModel {
            cost_center_id: Set(cost_center_id),
            month: Set(month.to_string()),
            currency: Set(input.currency.unwrap_or(self.default_currency)),
            amount: Set(amount),
            category: Set(input.category),
            description: Set(input.description),
            priority: Set(input.priority),
            approver: Set(input.approver),
            warning_threshold: Set(input.warning_threshold),
            critical_threshold: Set(input.critical_threshold),
            overspend_limit: Set(input.overspend_limit),
            auto_adjust: Set(input.auto_adjust.unwrap_or(false)),
            rollover_unused: Set(input.rollover_unused.unwrap_or(false)),
            require_approval: Set(input.require_approval.unwrap_or(false)),
            email_alerts: Set(input.email_alerts.unwrap_or(false)),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(budget_id = created.id, month = %created.month, "Budget created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_budget(
        &self,
        id: i32,
        input: BudgetInput,
    ) -> Result<budget::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = find_budget(db, id).await?;
        check_thresholds(
            input.warning_threshold.or(existing.warning_threshold),
            input.critical_threshold.or(existing.critical_threshold),
        )?;
        let mut active: budget::ActiveModel = existing.into();

        if let Some(cost_center_id) = input.cost_center_id {
            ensure_cost_center(db, cost_center_id).await?;
            active.cost_center_id = Set(cost_center_id);
        }
        if let Some(month) = input.month.as_deref() {
            active.month = Set(parse_month("month", month)?.to_string());
        }
        if let Some(currency) = input.currency {
            active.currency = Set(currency);
        }
        if let Some(amount) = input.amount {
            check_amount(amount)?;
            active.amount = Set(amount);
        }
        if let Some(category) = input.category {
            active.category = Set(Some(category));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(priority) = input.priority {
            active.priority = Set(Some(priority));
        }
        if let Some(approver) = input.approver {
            active.approver = Set(Some(approver));
        }
        if let Some(warning) = input.warning_threshold {
            active.warning_threshold = Set(Some(warning));
        }
        if let Some(critical) = input.critical_threshold {
            active.critical_threshold = Set(Some(critical));
        }
        if let Some(limit) = input.overspend_limit {
            active.overspend_limit = Set(Some(limit));
        }
        if let Some(flag) = input.auto_adjust {
            active.auto_adjust = Set(flag);
        }
        if let Some(flag) = input.rollover_unused {
            active.rollover_unused = Set(flag);
        }
        if let Some(flag) = input.require_approval {
            active.require_approval = Set(flag);
        }
        if let Some(flag) = input.email_alerts {
            active.email_alerts = Set(flag);
        }

        let updated = active.update(db).await?;
        info!(budget_id = id, "Budget updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_budget(&self, id: i32) -> Result<(), ServiceError> {
        let result = budget::Entity::delete_by_id(id).exec(&*self.db_pool).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Budget", id));
        }
        info!(budget_id = id, "Budget deleted");
        Ok(())
    }

    /// Deletes the budget identified by cost center, month and currency.
    #[instrument(skip(self))]
    pub async fn delete_by_key(&self, key: BudgetKeyQuery) -> Result<(), ServiceError> {
        let (Some(cost_center_id), Some(month), Some(currency)) =
            (key.cost_center_id, key.month.as_deref(), key.currency.as_deref())
        else {
            return Err(ServiceError::ValidationError(
                "cost_center_id, month/period and currency are required".to_string(),
            ));
        };
        let month = parse_month("month", month)?;
        let currency: Currency = currency.trim().parse().map_err(|_| {
            ServiceError::ValidationError(format!("Unknown currency '{}'", currency))
        })?;

        let result = budget::Entity::delete_many()
            .filter(budget::Column::CostCenterId.eq(cost_center_id))
            .filter(budget::Column::Month.eq(month.to_string()))
            .filter(budget::Column::Currency.eq(currency))
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Budget for cost center {} in {} {} not found",
                cost_center_id, month, currency
            )));
        }
        Ok(())
    }

    /// Copies every field of a budget into another month.
    #[instrument(skip(self))]
    pub async fn duplicate_budget(
        &self,
        id: i32,
        target_month: Option<&str>,
    ) -> Result<budget::Model, ServiceError> {
        let target = target_month
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("target_month/target_period is required".to_string())
            })?;
        let target = parse_month("target_month", target)?;
        let db = &*self.db_pool;
        let source = find_budget(db, id).await?;

        let copy = budget::ActiveModel {
            cost_center_id: Set(source.cost_center_id),
            month: Set(target.to_string()),
            currency: Set(source.currency),
            amount: Set(source.amount),
            category: Set(source.category),
            description: Set(source.description),
            priority: Set(source.priority),
            approver: Set(source.approver),
            warning_threshold: Set(source.warning_threshold),
            critical_threshold: Set(source.critical_threshold),
            overspend_limit: Set(source.overspend_limit),
            auto_adjust: Set(source.auto_adjust),
            rollover_unused: Set(source.rollover_unused),
            require_approval: Set(source.require_approval),
            email_alerts: Set(source.email_alerts),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(source_id = id, budget_id = copy.id, month = %copy.month, "Budget duplicated");
        Ok(copy)
    }

    /// Inserts a budget or, when its key already exists, replaces the amount.
    #[instrument(skip(self, input))]
    pub async fn upsert_budget(
        &self,
        input: UpsertBudgetInput,
    ) -> Result<budget::Model, ServiceError> {
        let (Some(cost_center_id), Some(month), Some(amount)) =
            (input.cost_center_id, input.month.as_deref(), input.amount)
        else {
            return Err(ServiceError::ValidationError(
                "cost_center_id, month/period and amount are required".to_string(),
            ));
        };
        let month = parse_month("month", month)?;
        check_amount(amount)?;
        let currency = input.currency.unwrap_or(self.default_currency);
        let db = &*self.db_pool;
        ensure_cost_center(db, cost_center_id).await?;

        upsert_amount(db, cost_center_id, month, currency, amount).await?;
        find_by_key(db, cost_center_id, month, currency).await
    }

    /// Monthly budget against spend for each cost center and currency over
    /// the trailing window ending at `until`.
    #[instrument(skip(self))]
    pub async fn trends(&self, query: TrendQuery) -> Result<Vec<BudgetTrend>, ServiceError> {
        let count = query.months.unwrap_or(DEFAULT_TREND_MONTHS);
        if count == 0 || count > MAX_TREND_MONTHS {
            return Err(ServiceError::ValidationError(format!(
                "months must be between 1 and {}",
                MAX_TREND_MONTHS
            )));
        }
        let until = month_or_current("until", query.until.as_deref())?;
        let window = until.trailing(count);
        let (first, last) = match (window.first(), window.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(vec![]),
        };

        let db = &*self.db_pool;
        let labels: Vec<String> = window.iter().map(Month::to_string).collect();
        let budgets = budget::Entity::find()
            .filter(budget::Column::Month.is_in(labels))
            .all(db)
            .await?;
        let spend = spending_by_center(db, first.first_day(), last.last_day()).await?;
        let centers: HashMap<i32, cost_center::Model> = cost_center::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|cc| (cc.id, cc))
            .collect();

        let mut budget_by_key: HashMap<(i32, Month, Currency), Decimal> = HashMap::new();
        let mut series: BTreeSet<(i32, Currency)> = BTreeSet::new();
        for b in &budgets {
            if let Ok(month) = b.month.parse::<Month>() {
                budget_by_key.insert((b.cost_center_id, month, b.currency), b.amount);
                series.insert((b.cost_center_id, b.currency));
            }
        }
        series.extend(spend.keys().map(|(id, _, currency)| (*id, *currency)));

        let trends = series
            .into_iter()
            .filter(|(id, currency)| {
                query.cost_center_id.map_or(true, |wanted| wanted == *id)
                    && query.currency.map_or(true, |wanted| wanted == *currency)
            })
            .filter_map(|(id, currency)| {
                let center = centers.get(&id)?;
                let points: Vec<TrendPoint> = window
                    .iter()
                    .map(|month| {
                        let budget = budget_by_key
                            .get(&(id, *month, currency))
                            .copied()
                            .unwrap_or(Decimal::ZERO);
                        let spent = spend
                            .get(&(id, *month, currency))
                            .copied()
                            .unwrap_or_default()
                            .total;
                        TrendPoint {
                            month: *month,
                            budget,
                            spent,
                            utilization: utilization(spent, budget),
                        }
                    })
                    .collect();

                let spent: Vec<Decimal> = points.iter().map(|p| p.spent).collect();
                let projected_spend = project_spend(&spent);
                let last_budget = points
                    .iter()
                    .rev()
                    .map(|p| p.budget)
                    .find(|b| !b.is_zero())
                    .unwrap_or(Decimal::ZERO);

                Some(BudgetTrend {
                    cost_center_id: id,
                    cost_center_code: center.code.clone(),
                    cost_center_name: center.name.clone(),
                    currency,
                    trend_percent: trend_percent(&spent),
                    projected_spend,
                    last_budget,
                    risk: classify_risk(projected_spend, last_budget),
                    points,
                })
            })
            .collect();

        Ok(trends)
    }

    /// Budgets with their spend as a spreadsheet-friendly CSV document:
    /// UTF-8 byte-order mark, CRLF line ends, every field quoted.
    #[instrument(skip(self))]
    pub async fn export_csv(&self, query: ExportQuery) -> Result<String, ServiceError> {
        let db = &*self.db_pool;
        let mut select = budget::Entity::find()
            .find_also_related(cost_center::Entity)
            .order_by_desc(budget::Column::Month)
            .order_by_asc(cost_center::Column::Code)
            .order_by_asc(budget::Column::Currency);
        if let Some(raw) = query.month.as_deref().filter(|s| !s.trim().is_empty()) {
            let month = parse_month("month", raw)?;
            select = select.filter(budget::Column::Month.eq(month.to_string()));
        }
        if let Some(currency) = query.currency {
            select = select.filter(budget::Column::Currency.eq(currency));
        }
        let rows = select.all(db).await?;

        let months: Vec<Month> = rows
            .iter()
            .filter_map(|(b, _)| b.month.parse::<Month>().ok())
            .collect();
        let spend = match (months.iter().min(), months.iter().max()) {
            (Some(first), Some(last)) => {
                spending_by_center(db, first.first_day(), last.last_day()).await?
            }
            _ => HashMap::new(),
        };

        let mut out = String::from("\u{feff}");
        out.push_str(
            &CSV_HEADERS
                .iter()
                .map(|h| csv_field(h))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push_str("\r\n");

        for (budget, center) in &rows {
            let spent = budget
                .month
                .parse::<Month>()
                .ok()
                .and_then(|m| spend.get(&(budget.cost_center_id, m, budget.currency)))
                .copied()
                .unwrap_or_default()
                .total;
            let fields = [
                budget.id.to_string(),
                center.as_ref().map(|c| c.code.clone()).unwrap_or_default(),
                center.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
                budget.month.clone(),
                budget.currency.to_string(),
                budget.amount.normalize().to_string(),
                spent.normalize().to_string(),
                (budget.amount - spent).normalize().to_string(),
                format!("{:.2}", utilization(spent, budget.amount)),
                budget.category.clone().unwrap_or_default(),
                budget.priority.clone().unwrap_or_default(),
                budget.approver.clone().unwrap_or_default(),
                budget.description.clone().unwrap_or_default(),
            ];
            out.push_str(
                &fields
                    .iter()
                    .map(|f| csv_field(f))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            out.push_str("\r\n");
        }
        Ok(out)
    }

    /// Imports budgets in one transaction. Any invalid row rejects the whole
    /// batch with one error per offending row.
    #[instrument(skip(self, request), fields(rows = request.rows.len()))]
    pub async fn import_budgets(
        &self,
        request: BudgetImportRequest,
    ) -> Result<ImportSummary, ServiceError> {
        if request.rows.is_empty() {
            return Err(ServiceError::ValidationError(
                "rows must contain at least one budget".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let centers = cost_center::Entity::find().all(db).await?;
        let by_id: HashMap<i32, &cost_center::Model> = centers.iter().map(|c| (c.id, c)).collect();
        let by_code: HashMap<String, &cost_center::Model> = centers
            .iter()
            .map(|c| (c.code.to_lowercase(), c))
            .collect();

        let mut errors = Vec::new();
        let mut prepared = Vec::with_capacity(request.rows.len());
        let mut seen: BTreeMap<(i32, Month, Currency), usize> = BTreeMap::new();
        for (idx, row) in request.rows.iter().enumerate() {
            let center = match (row.cost_center_id, row.cost_center_code.as_deref()) {
                (Some(id), _) => by_id.get(&id).copied(),
                (None, Some(code)) => by_code.get(&code.to_lowercase()).copied(),
                (None, None) => None,
            };
            let Some(center) = center else {
                errors.push(RowError::new(idx, "unknown or missing cost center"));
                continue;
            };
            let Some(month) = row.month.as_deref().and_then(|m| m.trim().parse::<Month>().ok())
            else {
                errors.push(RowError::new(idx, "month must use the YYYY-MM format"));
                continue;
            };
            let amount = match row.amount {
                Some(amount) if amount > MAX_AMOUNT => {
                    errors.push(RowError::new(idx, "amount is too large"));
                    continue;
                }
                Some(amount) if amount >= Decimal::ZERO => amount,
                _ => {
                    errors.push(RowError::new(idx, "amount must be zero or positive"));
                    continue;
                }
            };
            let currency = row.currency.unwrap_or(self.default_currency);
            if let Some(first) = seen.insert((center.id, month, currency), idx) {
                errors.push(RowError::new(
                    idx,
                    format!("duplicates row {} ({} {} {})", first, center.code, month, currency),
                ));
                continue;
            }
            prepared.push((idx, center.id, month, currency, amount, row));
        }

        if !errors.is_empty() {
            warn!(rejected = errors.len(), "Budget import rejected");
            return Err(ServiceError::BatchRejected {
                message: format!("{} of {} rows were rejected", errors.len(), request.rows.len()),
                errors,
            });
        }

        let txn = db.begin().await?;
        let mut summary = ImportSummary::default();
        for (idx, cost_center_id, month, currency, amount, row) in prepared {
            let existing = budget::Entity::find()
                .filter(budget::Column::CostCenterId.eq(cost_center_id))
                .filter(budget::Column::Month.eq(month.to_string()))
                .filter(budget::Column::Currency.eq(currency))
                .one(&txn)
                .await?;

            match existing {
                Some(existing) if request.replace_existing => {
                    let mut active: budget::ActiveModel = existing.into();
                    active.amount = Set(amount);
                    if row.category.is_some() {
                        active.category = Set(row.category.clone());
                    }
                    if row.description.is_some() {
                        active.description = Set(row.description.clone());
                    }
                    active.update(&txn).await?;
                    summary.updated += 1;
                }
                Some(_) => {
                    txn.rollback().await?;
                    return Err(ServiceError::BatchRejected {
                        message: "1 row conflicts with an existing budget".to_string(),
                        errors: vec![RowError::new(
                            idx,
                            format!("a budget for {} {} already exists", month, currency),
                        )],
                    });
                }
                None => {
                    budget::ActiveModel {
                        cost_center_id: Set(cost_center_id),
                        month: Set(month.to_string()),
                        currency: Set(currency),
                        amount: Set(amount),
                        category: Set(row.category.clone()),
                        description: Set(row.description.clone()),
                        auto_adjust: Set(false),
                        rollover_unused: Set(false),
                        require_approval: Set(false),
                        email_alerts: Set(false),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                    summary.created += 1;
                }
            }
        }
        txn.commit().await?;

        info!(created = summary.created, updated = summary.updated, "Budgets imported");
        Ok(summary)
    }

    /// Applies one action to every listed budget, all or nothing.
    #[instrument(skip(self, request), fields(ids = request.ids.len()))]
    pub async fn bulk_update(
        &self,
        request: BulkUpdateRequest,
    ) -> Result<BulkUpdateSummary, ServiceError> {
        if request.ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "ids must list at least one budget".to_string(),
            ));
        }
        if let BulkAction::SetAmount { amount } = &request.action {
            check_amount(*amount)?;
        }

        let txn = self.db_pool.begin().await?;
        let mut errors = Vec::new();
        let mut affected = 0;
        for (idx, id) in request.ids.iter().enumerate() {
            let Some(existing) = budget::Entity::find_by_id(*id).one(&txn).await? else {
                errors.push(RowError::new(idx, format!("budget {} not found", id)));
                continue;
            };

            let amount = match &request.action {
                BulkAction::Delete => {
                    existing.delete(&txn).await?;
                    affected += 1;
                    continue;
                }
                BulkAction::SetAmount { amount } => Some(*amount),
                BulkAction::AdjustPercent { percent } => existing
                    .amount
                    .checked_mul(*percent)
                    .and_then(|change| change.checked_div(Decimal::ONE_HUNDRED))
                    .and_then(|change| existing.amount.checked_add(change))
                    .map(round_money),
                BulkAction::AdjustAmount { delta } => {
                    existing.amount.checked_add(*delta).map(round_money)
                }
            };
            let Some(amount) = amount.filter(|amount| *amount <= MAX_AMOUNT) else {
                errors.push(RowError::new(idx, format!("budget {} would become too large", id)));
                continue;
            };
            if amount < Decimal::ZERO {
                errors.push(RowError::new(
                    idx,
                    format!("budget {} would become negative", id),
                ));
                continue;
            }

            let mut active: budget::ActiveModel = existing.into();
            active.amount = Set(amount);
            active.update(&txn).await?;
            affected += 1;
        }

        if !errors.is_empty() {
            txn.rollback().await?;
            return Err(ServiceError::BatchRejected {
                message: format!("{} of {} budgets were rejected", errors.len(), request.ids.len()),
                errors,
            });
        }
        txn.commit().await?;

        info!(affected, action = ?request.action, "Budgets bulk updated");
        Ok(BulkUpdateSummary { affected })
    }
}

fn to_row((budget, center): (budget::Model, Option<cost_center::Model>)) -> BudgetRow {
    BudgetRow {
        budget,
        cost_center_code: center.as_ref().map(|c| c.code.clone()),
        cost_center_name: center.map(|c| c.name),
    }
}

fn check_amount(amount: Decimal) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "amount must be zero or positive".to_string(),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(ServiceError::ValidationError(format!(
            "amount cannot exceed {}",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

fn check_thresholds(warning: Option<Decimal>, critical: Option<Decimal>) -> Result<(), ServiceError> {
    if let (Some(warning), Some(critical)) = (warning, critical) {
        if warning >= critical {
            return Err(ServiceError::ValidationError(
                "warning_threshold must be lower than critical_threshold".to_string(),
            ));
        }
    }
    Ok(())
}

async fn find_budget<C: ConnectionTrait>(conn: &C, id: i32) -> Result<budget::Model, ServiceError> {
    budget::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Budget", id))
}

async fn ensure_cost_center<C: ConnectionTrait>(conn: &C, id: i32) -> Result<(), ServiceError> {
    let exists = cost_center::Entity::find_by_id(id).one(conn).await?.is_some();
    if !exists {
        return Err(ServiceError::ValidationError(format!(
            "Cost center {} does not exist",
            id
        )));
    }
    Ok(())
}

async fn find_by_key<C: ConnectionTrait>(
    conn: &C,
    cost_center_id: i32,
    month: Month,
    currency: Currency,
) -> Result<budget::Model, ServiceError> {
    budget::Entity::find()
        .filter(budget::Column::CostCenterId.eq(cost_center_id))
        .filter(budget::Column::Month.eq(month.to_string()))
        .filter(budget::Column::Currency.eq(currency))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Budget for cost center {} in {} {} not found",
                cost_center_id, month, currency
            ))
        })
}

async fn upsert_amount<C: ConnectionTrait>(
    conn: &C,
    cost_center_id: i32,
    month: Month,
    currency: Currency,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    budget::Entity::insert(budget::ActiveModel {
        cost_center_id: Set(cost_center_id),
        month: Set(month.to_string()),
        currency: Set(currency),
        amount: Set(amount),
        auto_adjust: Set(false),
        rollover_unused: Set(false),
        require_approval: Set(false),
        email_alerts: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([
            budget::Column::CostCenterId,
            budget::Column::Month,
            budget::Column::Currency,
        ])
        .update_columns([budget::Column::Amount, budget::Column::UpdatedAt])
        .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::entities::purchase_order::{self, OrderStatus};
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Arc<DbPool>,
        svc: BudgetService,
        it: cost_center::Model,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(test_pool().await);
        let it = cost_center::ActiveModel {
            code: Set("CC-IT".into()),
            name: Set("Tecnología".into()),
            is_active: Set(true),
            currency: Set(Currency::Clp),
            requires_approval: Set(false),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();
        Fixture {
            svc: BudgetService::new(db.clone(), Currency::Clp),
            db,
            it,
        }
    }

    fn input(center: i32, month: &str, amount: Decimal) -> BudgetInput {
        BudgetInput {
            cost_center_id: Some(center),
            month: Some(month.into()),
            amount: Some(amount),
            ..Default::default()
        }
    }

    async fn order(db: &DbPool, center: i32, number: &str, date: NaiveDate, total: Decimal) {
        purchase_order::ActiveModel {
            order_number: Set(number.into()),
            cost_center_id: Set(center),
            currency: Set(Currency::Clp),
            order_date: Set(date),
            status: Set(OrderStatus::Approved),
            subtotal: Set(total),
            tax_amount: Set(Decimal::ZERO),
            total_amount: Set(total),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[rstest]
    #[case(&[], 0.0)]
    #[case(&[dec!(100)], 0.0)]
    #[case(&[dec!(100), dec!(150)], 50.0)]
    #[case(&[dec!(200), dec!(999), dec!(100)], -50.0)]
    #[case(&[dec!(0), dec!(0), dec!(10), dec!(30)], 100.0)]
    fn trend_compares_halves(#[case] spent: &[Decimal], #[case] expected: f64) {
        assert!((trend_percent(spent) - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case(dec!(1100), dec!(1000), RiskLevel::High)]
    #[case(dec!(1000), dec!(1000), RiskLevel::Medium)]
    #[case(dec!(901), dec!(1000), RiskLevel::Medium)]
    #[case(dec!(900), dec!(1000), RiskLevel::Low)]
    #[case(dec!(1), dec!(0), RiskLevel::High)]
    fn risk_levels(#[case] projected: Decimal, #[case] budget: Decimal, #[case] expected: RiskLevel) {
        assert_eq!(classify_risk(projected, budget), expected);
    }

    #[test]
    fn bulk_action_is_tagged() {
        let request: BulkUpdateRequest =
            serde_json::from_str(r#"{"ids":[1,2],"action":"adjust_percent","percent":10}"#).unwrap();
        assert_eq!(request.action, BulkAction::AdjustPercent { percent: dec!(10) });
        let request: BulkUpdateRequest =
            serde_json::from_str(r#"{"ids":[3],"action":"delete"}"#).unwrap();
        assert_eq!(request.action, BulkAction::Delete);
    }

    #[tokio::test]
    async fn key_is_unique_and_upsert_replaces_amount() {
        let f = fixture().await;
        f.svc.create_budget(input(f.it.id, "2025-01", dec!(8000000))).await.unwrap();

        let duplicate = f
            .svc
            .create_budget(input(f.it.id, "2025-01", dec!(1)))
            .await
            .unwrap_err();
        assert!(duplicate.is_unique_violation());

        let upserted = f
            .svc
            .upsert_budget(UpsertBudgetInput {
                cost_center_id: Some(f.it.id),
                month: Some("2025-01".into()),
                currency: None,
                amount: Some(dec!(9000000)),
            })
            .await
            .unwrap();
        assert_eq!(upserted.amount.round_dp(2), dec!(9000000));
        assert_eq!(f.svc.list_budgets().await.unwrap().len(), 1);

        // another currency is a separate budget
        f.svc
            .upsert_budget(UpsertBudgetInput {
                cost_center_id: Some(f.it.id),
                month: Some("2025-01".into()),
                currency: Some(Currency::Usd),
                amount: Some(dec!(1200)),
            })
            .await
            .unwrap();
        assert_eq!(f.svc.list_budgets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_requires_key_fields() {
        let f = fixture().await;
        assert_matches!(
            f.svc.create_budget(BudgetInput::default()).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            f.svc.create_budget(input(f.it.id, "2025/01", dec!(1))).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            f.svc.create_budget(input(999, "2025-01", dec!(1))).await,
            Err(ServiceError::ValidationError(_))
        );
        let mut bad_thresholds = input(f.it.id, "2025-01", dec!(1));
        bad_thresholds.warning_threshold = Some(dec!(90));
        bad_thresholds.critical_threshold = Some(dec!(85));
        assert_matches!(
            f.svc.create_budget(bad_thresholds).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn partial_update_and_duplicate_copy_fields() {
        let f = fixture().await;
        let mut original = input(f.it.id, "2025-01", dec!(500000));
        original.category = Some("Software".into());
        original.warning_threshold = Some(dec!(70));
        original.email_alerts = Some(true);
        let created = f.svc.create_budget(original).await.unwrap();

        let updated = f
            .svc
            .update_budget(
                created.id,
                BudgetInput {
                    amount: Some(dec!(600000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category.as_deref(), Some("Software"));
        assert_eq!(updated.amount.round_dp(2), dec!(600000));

        let copy = f
            .svc
            .duplicate_budget(created.id, Some("2025-02"))
            .await
            .unwrap();
        assert_eq!(copy.month, "2025-02");
        assert_eq!(copy.category.as_deref(), Some("Software"));
        assert!(copy.email_alerts);
        assert_eq!(copy.warning_threshold.map(|t| t.round_dp(2)), Some(dec!(70)));

        assert_matches!(
            f.svc.duplicate_budget(created.id, None).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(f
            .svc
            .duplicate_budget(created.id, Some("2025-02"))
            .await
            .unwrap_err()
            .is_unique_violation());
    }

    #[tokio::test]
    async fn delete_by_key_reports_missing_rows() {
        let f = fixture().await;
        f.svc.create_budget(input(f.it.id, "2025-01", dec!(10))).await.unwrap();
        let key = BudgetKeyQuery {
            cost_center_id: Some(f.it.id),
            month: Some("2025-01".into()),
            currency: Some("clp".into()),
        };
        f.svc.delete_by_key(key.clone()).await.unwrap();
        assert_matches!(f.svc.delete_by_key(key).await, Err(ServiceError::NotFound(_)));
        assert_matches!(
            f.svc.delete_by_key(BudgetKeyQuery::default()).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn trends_project_mean_spend() {
        let f = fixture().await;
        for (month, amount) in [("2025-01", dec!(1000)), ("2025-02", dec!(1000)), ("2025-03", dec!(1000))] {
            f.svc.create_budget(input(f.it.id, month, amount)).await.unwrap();
        }
        let day = |m| NaiveDate::from_ymd_opt(2025, m, 10).unwrap();
        order(&f.db, f.it.id, "T-1", day(1), dec!(800)).await;
        order(&f.db, f.it.id, "T-2", day(2), dec!(1000)).await;
        order(&f.db, f.it.id, "T-3", day(3), dec!(1200)).await;

        let trends = f
            .svc
            .trends(TrendQuery {
                months: Some(3),
                until: Some("2025-03".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(trends.len(), 1);
        let trend = &trends[0];
        assert_eq!(trend.points.len(), 3);
        assert_eq!(trend.points[0].month.to_string(), "2025-01");
        assert!((trend.trend_percent - 50.0).abs() < 1e-9);
        assert_eq!(trend.projected_spend, dec!(1000));
        assert_eq!(trend.risk, RiskLevel::Medium);

        assert_matches!(
            f.svc
                .trends(TrendQuery {
                    months: Some(0),
                    ..Default::default()
                })
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn export_quotes_every_field() {
        let f = fixture().await;
        let mut row = input(f.it.id, "2025-01", dec!(8000000));
        row.description = Some("Licencias \"cloud\", soporte".into());
        f.svc.create_budget(row).await.unwrap();
        order(
            &f.db,
            f.it.id,
            "E-1",
            NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            dec!(6500000),
        )
        .await;

        let csv = f.svc.export_csv(ExportQuery::default()).await.unwrap();
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split("\r\n").collect();
        assert!(lines[0].starts_with("\"ID\",\"Cost Center Code\""));
        assert!(lines[1].contains("\"CC-IT\",\"Tecnología\",\"2025-01\",\"CLP\",\"8000000\",\"6500000\",\"1500000\",\"81.25\""));
        assert!(lines[1].ends_with("\"Licencias \"\"cloud\"\", soporte\""));
        assert_eq!(lines[2], "");
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let f = fixture().await;
        let rejected = f
            .svc
            .import_budgets(BudgetImportRequest {
                rows: vec![
                    BudgetImportRow {
                        cost_center_code: Some("cc-it".into()),
                        month: Some("2025-04".into()),
                        amount: Some(dec!(100)),
                        ..Default::default()
                    },
                    BudgetImportRow {
                        cost_center_code: Some("CC-NOPE".into()),
                        month: Some("2025-04".into()),
                        amount: Some(dec!(100)),
                        ..Default::default()
                    },
                    BudgetImportRow {
                        cost_center_id: Some(f.it.id),
                        month: Some("abril".into()),
                        amount: Some(dec!(100)),
                        ..Default::default()
                    },
                ],
                replace_existing: false,
            })
            .await
            .unwrap_err();
        assert_matches!(rejected, ServiceError::BatchRejected { ref errors, .. } => {
            assert_eq!(errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![1, 2]);
        });
        assert!(f.svc.list_budgets().await.unwrap().is_empty());

        f.svc.create_budget(input(f.it.id, "2025-05", dec!(1))).await.unwrap();
        let rows = vec![
            BudgetImportRow {
                cost_center_id: Some(f.it.id),
                month: Some("2025-04".into()),
                amount: Some(dec!(100)),
                ..Default::default()
            },
            BudgetImportRow {
                cost_center_id: Some(f.it.id),
                month: Some("2025-05".into()),
                amount: Some(dec!(200)),
                ..Default::default()
            },
        ];
        assert_matches!(
            f.svc
                .import_budgets(BudgetImportRequest {
                    rows: rows.clone(),
                    replace_existing: false,
                })
                .await,
            Err(ServiceError::BatchRejected { .. })
        );
        assert_eq!(f.svc.list_budgets().await.unwrap().len(), 1);

        let summary = f
            .svc
            .import_budgets(BudgetImportRequest {
                rows,
                replace_existing: true,
            })
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { created: 1, updated: 1 });
    }

    #[tokio::test]
    async fn bulk_update_rolls_back_on_missing_ids() {
        let f = fixture().await;
        let a = f.svc.create_budget(input(f.it.id, "2025-01", dec!(1000))).await.unwrap();
        let b = f.svc.create_budget(input(f.it.id, "2025-02", dec!(2000))).await.unwrap();

        let summary = f
            .svc
            .bulk_update(BulkUpdateRequest {
                ids: vec![a.id, b.id],
                action: BulkAction::AdjustPercent { percent: dec!(10) },
            })
            .await
            .unwrap();
        assert_eq!(summary.affected, 2);
        assert_eq!(f.svc.get_budget(b.id).await.unwrap().budget.amount.round_dp(2), dec!(2200));

        let err = f
            .svc
            .bulk_update(BulkUpdateRequest {
                ids: vec![a.id, 999],
                action: BulkAction::Delete,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::BatchRejected { .. });
        assert!(f.svc.get_budget(a.id).await.is_ok());

        let err = f
            .svc
            .bulk_update(BulkUpdateRequest {
                ids: vec![a.id],
                action: BulkAction::AdjustAmount { delta: dec!(-5000) },
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::BatchRejected { .. });
    }

    #[tokio::test]
    async fn oversized_amounts_are_rejected() {
        let f = fixture().await;
        let err = f
            .svc
            .create_budget(input(f.it.id, "2025-01", MAX_AMOUNT + dec!(1)))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));

        let budget = f.svc.create_budget(input(f.it.id, "2025-01", dec!(1000))).await.unwrap();
        for action in [
            BulkAction::AdjustPercent { percent: Decimal::MAX },
            BulkAction::AdjustAmount { delta: Decimal::MAX },
            BulkAction::AdjustAmount { delta: MAX_AMOUNT },
        ] {
            let err = f
                .svc
                .bulk_update(BulkUpdateRequest { ids: vec![budget.id], action })
                .await
                .unwrap_err();
            assert_matches!(err, ServiceError::BatchRejected { .. });
        }
        let stored = f.svc.get_budget(budget.id).await.unwrap().budget.amount;
        assert_eq!(stored.round_dp(2), dec!(1000));
    }
}
