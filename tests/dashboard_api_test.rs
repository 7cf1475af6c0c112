//! Control panel aggregates.

mod common;

use axum::http::Method;
use common::{decimal, this_month, this_month_date, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn stats_count_orders_per_status() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;
    let first = app
        .create_order(supplier, center, "CLP", &this_month_date(), 1000.0)
        .await;
    app.create_order(supplier, center, "CLP", &this_month_date(), 2000.0)
        .await;
    app.send_ok(
        Method::PUT,
        &format!("/api/orders/{}/status", first["order"]["id"]),
        Some(json!({ "status": "received" })),
    )
    .await;

    let stats = app.send_ok(Method::GET, "/api/dashboard/stats", None).await;

    assert_eq!(stats["total_orders"], 2);
    assert_eq!(stats["pending_orders"], 1);
    assert_eq!(stats["status_counts"]["received"], 1);
    assert_eq!(decimal(&stats["total_amount"]["CLP"]).round_dp(2), dec!(3570));
    assert_eq!(stats["recent_orders"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn orders_trend_covers_requested_months() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;
    app.create_order(supplier, center, "CLP", &this_month_date(), 1000.0)
        .await;

    let trend = app
        .send_ok(Method::GET, "/api/dashboard/orders-trend?months=4", None)
        .await;
    let trend = trend.as_array().unwrap();

    assert_eq!(trend.len(), 4);
    let last = trend.last().unwrap();
    assert_eq!(last["month"], this_month());
    assert_eq!(last["currencies"]["CLP"]["count"], 1);

    let too_many = app
        .request_authenticated(Method::GET, "/api/dashboard/orders-trend?months=99", None)
        .await;
    assert_eq!(too_many.status(), 400);
}

#[tokio::test]
async fn spending_summary_skips_cancelled_orders() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Insumos Norte").await;
    let center = app.create_cost_center("CC-ADM", "CLP").await;
    app.create_order(supplier, center, "CLP", &this_month_date(), 1000.0)
        .await;
    let cancelled = app
        .create_order(supplier, center, "CLP", &this_month_date(), 5000.0)
        .await;
    app.send_ok(
        Method::PUT,
        &format!("/api/orders/{}/status", cancelled["order"]["id"]),
        Some(json!({ "status": "cancelled" })),
    )
    .await;

    let summary = app
        .send_ok(Method::GET, "/api/dashboard/spending-summary", None)
        .await;

    assert_eq!(summary[0]["supplier_name"], "Insumos Norte");
    assert_eq!(summary[0]["order_count"], 1);
    assert_eq!(decimal(&summary[0]["total_spent"]).round_dp(2), dec!(1190));
}
