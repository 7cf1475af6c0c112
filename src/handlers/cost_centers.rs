use super::common::{created_response, split_csv_param, success_response, validate_input};
use crate::{
    common::{month_or_current, parse_month},
    errors::ServiceError,
    listing::ListQuery,
    money::Currency,
    period::Month,
    services::cost_centers::{CostCenterInput, CostCenterUpdate},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

/// Months compared when `periods` is not given
const DEFAULT_COMPARISON_MONTHS: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct UsageQuery {
    pub month: Option<String>,
    pub cost_center_id: Option<i32>,
    pub currency: Option<Currency>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(alias = "month")]
    pub period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComparisonQuery {
    /// Comma separated `YYYY-MM` values
    pub periods: Option<String>,
}

async fn list_cost_centers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.services.cost_centers.list_cost_centers().await?;
    Ok(success_response(query.apply(rows)?))
}

async fn create_cost_center(
    State(state): State<AppState>,
    Json(payload): Json<CostCenterInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let center = state
        .services
        .cost_centers
        .create_cost_center(payload)
        .await?;
    info!(cost_center_id = center.id, code = %center.code, "Cost center created");
    Ok(created_response(center))
}

async fn get_cost_center(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.cost_centers.get_cost_center(id).await?,
    ))
}

/// Partial update; absent fields keep their value
async fn update_cost_center(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CostCenterUpdate>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    Ok(success_response(
        state
            .services
            .cost_centers
            .update_cost_center(id, payload)
            .await?,
    ))
}

/// Flips the active flag; cost centers are never removed
async fn toggle_cost_center(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let center = state.services.cost_centers.toggle_active(id).await?;
    info!(cost_center_id = id, is_active = center.is_active, "Cost center toggled");
    Ok(success_response(center))
}

/// Budget usage per cost center and currency for one month
async fn usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Response, ServiceError> {
    let raw = query
        .month
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("month is required (YYYY-MM)".to_string()))?;
    let month = parse_month("month", raw)?;
    Ok(success_response(
        state
            .services
            .cost_centers
            .usage(month, query.cost_center_id, query.currency)
            .await?,
    ))
}

async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, ServiceError> {
    let period = month_or_current("period", query.period.as_deref())?;
    Ok(success_response(
        state.services.cost_centers.metrics(period).await?,
    ))
}

async fn performance_comparison(
    State(state): State<AppState>,
    Query(query): Query<ComparisonQuery>,
) -> Result<Response, ServiceError> {
    let raw = split_csv_param(query.periods.as_deref());
    let periods = if raw.is_empty() {
        Month::current().trailing(DEFAULT_COMPARISON_MONTHS)
    } else {
        raw.into_iter()
            .map(|p| parse_month("periods", p))
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(success_response(
        state
            .services
            .cost_centers
            .performance_comparison(periods)
            .await?,
    ))
}

pub fn cost_center_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cost_centers).post(create_cost_center))
        .route("/usage", get(usage))
        .route("/metrics", get(metrics))
        .route("/performance-comparison", get(performance_comparison))
        .route(
            "/:id",
            get(get_cost_center)
                .put(update_cost_center)
                .delete(toggle_cost_center),
        )
}
