use super::common::{created_response, deleted_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    listing::ListQuery,
    services::suppliers::{ProductInput, ProductUpdate, SupplierInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use tracing::info;

/// List suppliers with their product counts
async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let rows = state.services.suppliers.list_suppliers().await?;
    Ok(success_response(query.apply(rows)?))
}

/// Create a new supplier
async fn create_supplier(
    State(state): State<AppState>,
    Json(payload): Json<SupplierInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let supplier = state.services.suppliers.create_supplier(payload).await?;
    info!(supplier_id = supplier.id, "Supplier created");
    Ok(created_response(supplier))
}

/// Get a supplier by ID
async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.suppliers.get_supplier(id).await?,
    ))
}

/// Replace a supplier's fields
async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<SupplierInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    Ok(success_response(
        state.services.suppliers.update_supplier(id, payload).await?,
    ))
}

/// Delete a supplier and its catalog
async fn delete_supplier(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.suppliers.delete_supplier(id).await?;
    Ok(deleted_response(id))
}

async fn list_products(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    Ok(success_response(
        state.services.suppliers.list_products(id).await?,
    ))
}

/// Add a product to a supplier's catalog; the product code is generated
async fn create_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ProductInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let product = state.services.suppliers.create_product(id, payload).await?;
    info!(supplier_id = id, product_code = %product.product_code, "Product created");
    Ok(created_response(product))
}

async fn update_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(i32, i32)>,
    Json(payload): Json<ProductUpdate>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    Ok(success_response(
        state
            .services
            .suppliers
            .update_product(id, product_id, payload)
            .await?,
    ))
}

async fn delete_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(i32, i32)>,
) -> Result<Response, ServiceError> {
    state
        .services
        .suppliers
        .delete_product(id, product_id)
        .await?;
    Ok(deleted_response(product_id))
}

/// Creates the router for supplier endpoints
pub fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route("/:id/products", get(list_products).post(create_product))
        .route(
            "/:id/products/:product_id",
            put(update_product).delete(delete_product),
        )
}
