//! Supplier and catalog endpoints.

mod common;

use axum::http::Method;
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn supplier_round_trip() {
    let app = TestApp::new().await;
    let id = app.create_supplier("Ferretería Central").await;

    let fetched = app
        .send_ok(Method::GET, &format!("/api/suppliers/{}", id), None)
        .await;
    assert_eq!(fetched["name"], "Ferretería Central");
    assert_eq!(fetched["contact_person"], "Ana Rojas");

    let updated = app
        .send_ok(
            Method::PUT,
            &format!("/api/suppliers/{}", id),
            Some(json!({ "name": "Ferretería Central Ltda.", "city": "Valparaíso" })),
        )
        .await;
    assert_eq!(updated["name"], "Ferretería Central Ltda.");
    assert_eq!(updated["city"], "Valparaíso");

    let page = app.send_ok(Method::GET, "/api/suppliers?search=central", None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["product_count"], 0);

    app.send_ok(Method::DELETE, &format!("/api/suppliers/{}", id), None)
        .await;
    let response = app
        .request_authenticated(Method::GET, &format!("/api/suppliers/{}", id), None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn supplier_requires_a_name() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::POST, "/api/suppliers", Some(json!({ "name": "" })))
        .await;

    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn product_codes_are_generated_per_supplier() {
    let app = TestApp::new().await;
    let id = app.create_supplier("Papelería Sur").await;

    let mut codes = Vec::new();
    for name in ["Resma carta", "Lápiz grafito"] {
        let product = app
            .send_ok(
                Method::POST,
                &format!("/api/suppliers/{}/products", id),
                Some(json!({ "product_name": name, "unit_price": 4990 })),
            )
            .await;
        codes.push(product["product_code"].as_str().unwrap().to_string());
    }

    assert_eq!(codes[0], format!("PROV{}-PROD001", id));
    assert_eq!(codes[1], format!("PROV{}-PROD002", id));

    let products = app
        .send_ok(Method::GET, &format!("/api/suppliers/{}/products", id), None)
        .await;
    assert_eq!(products.as_array().unwrap().len(), 2);
    assert_eq!(decimal(&products[0]["unit_price"]), dec!(4990));

    let available = app
        .send_ok(
            Method::GET,
            &format!("/api/orders/products/available?supplier_id={}", id),
            None,
        )
        .await;
    assert_eq!(available.as_array().unwrap().len(), 2);
    assert_eq!(available[0]["supplier_name"], "Papelería Sur");
}

#[tokio::test]
async fn product_of_another_supplier_is_not_found() {
    let app = TestApp::new().await;
    let first = app.create_supplier("Proveedor Uno").await;
    let second = app.create_supplier("Proveedor Dos").await;
    let product = app
        .send_ok(
            Method::POST,
            &format!("/api/suppliers/{}/products", first),
            Some(json!({ "product_name": "Guantes", "unit_price": 1500 })),
        )
        .await;

    let response = app
        .request_authenticated(
            Method::DELETE,
            &format!("/api/suppliers/{}/products/{}", second, product["id"]),
            None,
        )
        .await;

    assert_eq!(response.status(), 404);
}
