use super::common::{created_response, deleted_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    listing::ListQuery,
    services::orders::{CreateOrderInput, UpdateOrderStatusInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct AvailableProductsQuery {
    pub supplier_id: Option<i32>,
}

/// List orders, newest first unless another sort is requested
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.services.orders.list_orders().await?;
    Ok(success_response(query.apply(rows)?))
}

/// Create an order with its items
async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let detail = state.services.orders.create_order(payload).await?;
    info!(
        order_id = detail.order.id,
        order_number = %detail.order.order_number,
        "Order created"
    );
    Ok(created_response(detail))
}

/// Get an order with supplier, cost center and items
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.services.orders.get_order(id).await?))
}

/// Change the status of an order
async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let order = state
        .services
        .orders
        .update_status(id, &payload.status)
        .await?;
    info!(order_id = id, status = %order.status, "Order status updated");
    Ok(success_response(order))
}

/// Delete an order and its items
async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(deleted_response(id))
}

/// Catalog products that can be ordered
async fn available_products(
    State(state): State<AppState>,
    Query(query): Query<AvailableProductsQuery>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state
            .services
            .suppliers
            .available_products(query.supplier_id)
            .await?,
    ))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/products/available", get(available_products))
        .route(
            "/:id",
            get(get_order).put(update_order_status).delete(delete_order),
        )
        .route("/:id/status", put(update_order_status))
}
