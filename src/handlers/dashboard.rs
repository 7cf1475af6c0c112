use super::common::success_response;
use crate::{errors::ServiceError, services::dashboard::DEFAULT_TREND_MONTHS, AppState};
use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub months: Option<usize>,
}

async fn stats(State(state): State<AppState>) -> Result<Response, ServiceError> {
    Ok(success_response(state.services.dashboard.stats().await?))
}

async fn orders_trend(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Response, ServiceError> {
    let months = query.months.unwrap_or(DEFAULT_TREND_MONTHS);
    Ok(success_response(
        state.services.dashboard.orders_trend(months).await?,
    ))
}

async fn spending_summary(State(state): State<AppState>) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.dashboard.spending_summary().await?,
    ))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/orders-trend", get(orders_trend))
        .route("/spending-summary", get(spending_summary))
}
