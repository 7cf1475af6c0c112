//! Purchase order lifecycle over HTTP.

mod common;

use axum::http::Method;
use common::{decimal, response_json, this_month_date, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn order_totals_include_vat() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;

    let detail = app
        .send_ok(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier,
                "cost_center_id": center,
                "currency": "CLP",
                "order_date": this_month_date(),
                "items": [
                    { "product_name": "Resma carta", "quantity": 10, "unit_price": 4990 },
                    { "product_name": "Tóner", "quantity": 2, "unit_price": 45990 }
                ]
            })),
        )
        .await;

    let order = &detail["order"];
    assert_eq!(decimal(&order["subtotal"]), dec!(141880));
    assert_eq!(decimal(&order["tax_amount"]).round_dp(2), dec!(26957.20));
    assert_eq!(decimal(&order["total_amount"]).round_dp(2), dec!(168837.20));
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_terms"], "30 días");
    assert_eq!(detail["items"].as_array().unwrap().len(), 2);
    assert_eq!(detail["cost_center"]["code"], "CC-ADM");

    let page = app.send_ok(Method::GET, "/api/orders", None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["supplier_name"], "Insumos Norte");
    assert_eq!(page["items"][0]["items_count"], 2);
}

#[tokio::test]
async fn currency_mismatch_creates_nothing() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Importadora Pacífico").await;
    let center = app.create_cost_center("CC-IT", "USD").await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier,
                "cost_center_id": center,
                "currency": "USD",
                "items": [
                    { "product_name": "Licencia", "quantity": 1, "unit_price": 120, "currency": "USD" },
                    { "product_name": "Soporte", "quantity": 1, "unit_price": 50000, "currency": "CLP" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let page = app.send_ok(Method::GET, "/api/orders", None).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn inactive_cost_center_is_rejected() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-OP", "CLP").await;

    // DELETE deactivates
    let toggled = app
        .send_ok(Method::DELETE, &format!("/api/cost-centers/{}", center), None)
        .await;
    assert_eq!(toggled["is_active"], false);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier,
                "cost_center_id": center,
                "items": [{ "product_name": "Casco", "quantity": 1, "unit_price": 9990 }]
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn order_needs_items_and_cost_center() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;

    let no_items = app
        .request_authenticated(
            Method::POST,
            "/api/orders",
            Some(json!({ "supplier_id": supplier, "cost_center_id": center, "items": [] })),
        )
        .await;
    assert_eq!(no_items.status(), 400);

    let no_center = app
        .request_authenticated(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier,
                "items": [{ "product_name": "Casco", "quantity": 1, "unit_price": 9990 }]
            })),
        )
        .await;
    assert_eq!(no_center.status(), 400);
}

#[tokio::test]
async fn status_updates_and_delete() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;
    let detail = app
        .create_order(supplier, center, "CLP", &this_month_date(), 10000.0)
        .await;
    let id = detail["order"]["id"].as_i64().unwrap();

    let updated = app
        .send_ok(
            Method::PUT,
            &format!("/api/orders/{}/status", id),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(updated["status"], "approved");

    let bad = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/orders/{}", id),
            Some(json!({ "status": "shipped-by-drone" })),
        )
        .await;
    assert_eq!(bad.status(), 400);

    app.send_ok(Method::DELETE, &format!("/api/orders/{}", id), None)
        .await;
    let gone = app
        .request_authenticated(Method::GET, &format!("/api/orders/{}", id), None)
        .await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn order_numbers_are_unique() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;

    let first = app
        .create_order(supplier, center, "CLP", &this_month_date(), 1000.0)
        .await;
    let second = app
        .create_order(supplier, center, "CLP", &this_month_date(), 2000.0)
        .await;

    assert_ne!(first["order"]["order_number"], second["order"]["order_number"]);
}

#[tokio::test]
async fn oversized_line_is_a_validation_error() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Maquinaria Sur").await;
    let center = app.create_cost_center("CC-OP", "CLP").await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier,
                "cost_center_id": center,
                "currency": "CLP",
                "order_date": this_month_date(),
                "items": [{
                    "product_name": "Excavadora",
                    "quantity": "100000000000000000000",
                    "unit_price": "100000000000000000000"
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let page = app.send_ok(Method::GET, "/api/orders", None).await;
    assert_eq!(page["total"], 0);
}
