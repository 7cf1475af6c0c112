//! Purchase order documents, rendered through a fixed-output renderer.

mod common;

use axum::http::{header, Method};
use common::{response_bytes, this_month_date, TestApp, FAKE_PDF};

async fn seeded_order(app: &TestApp) -> (i64, String) {
    let supplier = app.create_supplier("Ferretería <Central> & Cía").await;
    let center = app.create_cost_center("CC-OP", "CLP").await;
    let detail = app
        .create_order(supplier, center, "CLP", &this_month_date(), 1234567.0)
        .await;
    (
        detail["order"]["id"].as_i64().unwrap(),
        detail["order"]["order_number"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn pdf_download_headers() {
    let app = TestApp::new().await;
    let (id, number) = seeded_order(&app).await;

    let response = app
        .request_authenticated(Method::GET, &format!("/api/pdf/order/{}", id), None)
        .await;

    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"Orden_Compra_"));
    assert!(disposition.contains(&number.replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "_")));
    assert_eq!(headers[header::CONTENT_LENGTH], FAKE_PDF.len().to_string());
    assert_eq!(response_bytes(response).await, FAKE_PDF);
}

#[tokio::test]
async fn pdf_inline_disposition() {
    let app = TestApp::new().await;
    let (id, _) = seeded_order(&app).await;

    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/pdf/order/{}?disposition=inline", id),
            None,
        )
        .await;

    assert_eq!(response.status(), 200);
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("inline;"));
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/pdf/order/4242", None)
        .await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn preview_is_escaped_html() {
    let app = TestApp::new().await;
    let (id, number) = seeded_order(&app).await;

    let response = app
        .request_authenticated(Method::GET, &format!("/api/pdf/order/{}/preview", id), None)
        .await;
    assert_eq!(response.status(), 200);

    let html = String::from_utf8(response_bytes(response).await).unwrap();
    assert!(html.contains("ORDEN DE COMPRA"));
    assert!(html.contains(&number));
    assert!(html.contains("Comercial Prueba SpA"));
    assert!(html.contains("Ferretería &lt;Central&gt; &amp; Cía"));
    assert!(!html.contains("<Central>"));
    // 1.234.567 + 19% VAT
    assert!(html.contains("1.469.135"));
}

#[tokio::test]
async fn pdf_requires_a_token() {
    let app = TestApp::new().await;
    let (id, _) = seeded_order(&app).await;

    let response = app
        .request(Method::GET, &format!("/api/pdf/order/{}", id), None, None)
        .await;

    assert_eq!(response.status(), 401);
}
