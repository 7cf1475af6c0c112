//! Cost centers and budget consumption.

mod common;

use axum::http::Method;
use common::{decimal, response_json, this_month, this_month_date, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn delete_toggles_active_flag() {
    let app = TestApp::new().await;
    let id = app.create_cost_center("CC-ADM", "CLP").await;
    let uri = format!("/api/cost-centers/{}", id);

    let first = app.send_ok(Method::DELETE, &uri, None).await;
    assert_eq!(first["is_active"], false);

    let second = app.send_ok(Method::DELETE, &uri, None).await;
    assert_eq!(second["is_active"], true);

    let fetched = app.send_ok(Method::GET, &uri, None).await;
    assert_eq!(fetched["is_active"], true);
}

#[tokio::test]
async fn duplicate_code_is_a_conflict() {
    let app = TestApp::new().await;
    app.create_cost_center("CC-IT", "USD").await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/cost-centers",
            Some(json!({ "code": "CC-IT", "name": "Tecnología bis" })),
        )
        .await;

    assert_eq!(response.status(), 409);
    let body = response_json(response).await;
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn usage_reports_warning_above_eighty_percent() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Cloud Services Inc.").await;
    let center = app.create_cost_center("CC-IT", "USD").await;
    app.create_budget(center, &this_month(), "USD", 3000.0).await;

    // 2100 + 19% VAT = 2499, or 83.3% of the budget
    app.create_order(supplier, center, "USD", &this_month_date(), 2100.0)
        .await;

    let rows = app
        .send_ok(
            Method::GET,
            &format!("/api/cost-centers/usage?month={}", this_month()),
            None,
        )
        .await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["cost_center_code"], "CC-IT");
    assert_eq!(row["currency"], "USD");
    assert_eq!(decimal(&row["spent"]).round_dp(2), dec!(2499));
    assert_eq!(decimal(&row["remaining"]).round_dp(2), dec!(501));
    assert_eq!(row["status"], "warning");
    assert_eq!(row["orders_count"], 1);
    let pct = row["utilization"].as_f64().unwrap();
    assert!((pct - 83.3).abs() < 0.01, "utilization was {}", pct);
}

#[tokio::test]
async fn spend_in_another_currency_does_not_count() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Proveedor Mixto").await;
    let center = app.create_cost_center("CC-OP", "CLP").await;
    app.create_budget(center, &this_month(), "CLP", 1_000_000.0).await;
    app.create_order(supplier, center, "USD", &this_month_date(), 900.0)
        .await;

    let rows = app
        .send_ok(
            Method::GET,
            &format!("/api/cost-centers/usage?month={}&currency=CLP", this_month()),
            None,
        )
        .await;

    assert_eq!(decimal(&rows[0]["spent"]), dec!(0));
    assert_eq!(rows[0]["status"], "normal");
}

#[tokio::test]
async fn usage_requires_a_valid_month() {
    let app = TestApp::new().await;

    let missing = app
        .request_authenticated(Method::GET, "/api/cost-centers/usage", None)
        .await;
    assert_eq!(missing.status(), 400);

    let malformed = app
        .request_authenticated(Method::GET, "/api/cost-centers/usage?month=2025-13", None)
        .await;
    assert_eq!(malformed.status(), 400);
}

#[tokio::test]
async fn metrics_default_to_current_period() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;
    app.create_budget(center, &this_month(), "CLP", 100_000.0).await;
    app.create_order(supplier, center, "CLP", &this_month_date(), 100_000.0)
        .await;

    let data = app.send_ok(Method::GET, "/api/cost-centers/metrics", None).await;

    assert_eq!(data["period"], this_month());
    assert_eq!(data["metrics"]["total_centers"], 1);
    assert_eq!(data["metrics"]["over_budget_centers"], 1);
    assert_eq!(data["centers"][0]["code"], "CC-ADM");
    assert_eq!(decimal(&data["centers"][0]["total_spent"]).round_dp(2), dec!(119000));
}

#[tokio::test]
async fn performance_comparison_rejects_bad_periods() {
    let app = TestApp::new().await;

    let ok = app
        .request_authenticated(Method::GET, "/api/cost-centers/performance-comparison", None)
        .await;
    assert_eq!(ok.status(), 200);
    let body = response_json(ok).await;
    assert_eq!(body["data"]["periods"].as_array().unwrap().len(), 3);

    let bad = app
        .request_authenticated(
            Method::GET,
            "/api/cost-centers/performance-comparison?periods=2025-01,enero",
            None,
        )
        .await;
    assert_eq!(bad.status(), 400);
}
