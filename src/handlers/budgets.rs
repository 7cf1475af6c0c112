use super::common::{created_response, deleted_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    listing::ListQuery,
    services::budgets::{
        BudgetImportRequest, BudgetInput, BudgetKeyQuery, BulkUpdateRequest, DuplicateBudgetInput,
        ExportQuery, TrendQuery, UpsertBudgetInput,
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::info;

async fn list_budgets(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.services.budgets.list_budgets().await?;
    Ok(success_response(query.apply(rows)?))
}

async fn create_budget(
    State(state): State<AppState>,
    Json(payload): Json<BudgetInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let budget = state.services.budgets.create_budget(payload).await?;
    info!(budget_id = budget.id, month = %budget.month, "Budget created");
    Ok(created_response(budget))
}

async fn get_budget(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.services.budgets.get_budget(id).await?))
}

async fn update_budget(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<BudgetInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    Ok(success_response(
        state.services.budgets.update_budget(id, payload).await?,
    ))
}

async fn delete_budget(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.budgets.delete_budget(id).await?;
    Ok(deleted_response(id))
}

/// `DELETE /api/budgets?cost_center_id&month&currency`
async fn delete_budget_by_key(
    State(state): State<AppState>,
    Query(key): Query<BudgetKeyQuery>,
) -> Result<Response, ServiceError> {
    state.services.budgets.delete_by_key(key.clone()).await?;
    Ok(success_response(json!({
        "cost_center_id": key.cost_center_id,
        "month": key.month,
        "currency": key.currency,
        "deleted": true,
    })))
}

/// Copies a budget into another month
async fn duplicate_budget(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<DuplicateBudgetInput>,
) -> Result<Response, ServiceError> {
    let copy = state
        .services
        .budgets
        .duplicate_budget(id, payload.target_month.as_deref())
        .await?;
    info!(source_id = id, budget_id = copy.id, month = %copy.month, "Budget duplicated");
    Ok(created_response(copy))
}

/// Inserts the budget or replaces the amount of the existing one
async fn upsert_budget(
    State(state): State<AppState>,
    Json(payload): Json<UpsertBudgetInput>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.budgets.upsert_budget(payload).await?,
    ))
}

async fn trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.services.budgets.trends(query).await?))
}

/// CSV download for spreadsheets
async fn export_budgets(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    let filename = format!(
        "presupuestos_{}.csv",
        query
            .month
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("todos")
    );
    let csv = state.services.budgets.export_csv(query).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

/// All-or-nothing import
async fn import_budgets(
    State(state): State<AppState>,
    Json(payload): Json<BudgetImportRequest>,
) -> Result<Response, ServiceError> {
    let rows = payload.rows.len();
    let summary = state.services.budgets.import_budgets(payload).await?;
    info!(rows, created = summary.created, updated = summary.updated, "Budgets imported");
    Ok(success_response(summary))
}

/// Applies one action to every listed budget, or to none
async fn bulk_update(
    State(state): State<AppState>,
    Json(payload): Json<BulkUpdateRequest>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.budgets.bulk_update(payload).await?,
    ))
}

pub fn budget_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_budgets)
                .post(create_budget)
                .delete(delete_budget_by_key),
        )
        .route("/trends", get(trends))
        .route("/export", get(export_budgets))
        .route("/import", post(import_budgets))
        .route("/bulk-update", post(bulk_update))
        .route("/upsert", post(upsert_budget))
        .route(
            "/:id",
            get(get_budget).put(update_budget).delete(delete_budget),
        )
        .route("/:id/duplicate", post(duplicate_budget))
}
