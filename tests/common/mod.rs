#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use buytrack_api::{
    auth,
    config::AppConfig,
    db::{self, DbConfig},
    services::documents::StaticPdfRenderer,
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const OPERATOR: &str = "admin";
pub const PASSWORD: &str = "compras-2025";
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n% test document\n%%EOF";

/// Helper harness for spinning up the application over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    token: String,
}

impl TestApp {
    /// Construct a new test application with fresh database state and a signed-in operator.
    pub async fn new() -> Self {
        // One connection keeps every query on the same in-memory database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "test".to_string(),
        );
        cfg.auth_password_hash = Some(auth::hash_password(PASSWORD).expect("hash test password"));
        cfg.company.name = "Comercial Prueba SpA".to_string();
        cfg.company.address = "Av. Apoquindo 3000, Santiago".to_string();
        cfg.company.purchasing_email = "compras@prueba.cl".to_string();

        let state = AppState::new(
            Arc::new(pool),
            cfg,
            Arc::new(StaticPdfRenderer::new(FAKE_PDF.to_vec())),
        );
        let router = buytrack_api::build_router(state.clone());

        let mut app = Self {
            router,
            state,
            token: String::new(),
        };
        app.token = app.login(OPERATOR, PASSWORD).await;
        app
    }

    /// Bearer token of the signed-in operator.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Logs in and returns the access token, panicking on failure.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "username": username, "password": password })),
                None,
            )
            .await;
        assert_eq!(response.status(), 200, "login should succeed");
        let body = response_json(response).await;
        body["data"]["access_token"]
            .as_str()
            .expect("access token in login response")
            .to_string()
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Authenticated request expecting a 2xx; returns the `data` member.
    pub async fn send_ok(&self, method: Method, uri: &str, body: Option<Value>) -> Value {
        let response = self.request_authenticated(method, uri, body).await;
        let status = response.status();
        let json = response_json(response).await;
        assert!(status.is_success(), "{} failed with {}: {}", uri, status, json);
        json["data"].clone()
    }

    pub async fn create_cost_center(&self, code: &str, currency: &str) -> i64 {
        let data = self
            .send_ok(
                Method::POST,
                "/api/cost-centers",
                Some(json!({ "code": code, "name": format!("Centro {}", code), "currency": currency })),
            )
            .await;
        data["id"].as_i64().expect("cost center id")
    }

    pub async fn create_supplier(&self, name: &str) -> i64 {
        let data = self
            .send_ok(
                Method::POST,
                "/api/suppliers",
                Some(json!({
                    "name": name,
                    "contact_person": "Ana Rojas",
                    "email": "ventas@proveedor.cl",
                    "payment_terms": "30 días"
                })),
            )
            .await;
        data["id"].as_i64().expect("supplier id")
    }

    pub async fn create_budget(&self, cost_center_id: i64, month: &str, currency: &str, amount: f64) -> Value {
        self.send_ok(
            Method::POST,
            "/api/budgets",
            Some(json!({
                "cost_center_id": cost_center_id,
                "month": month,
                "currency": currency,
                "amount": amount
            })),
        )
        .await
    }

    /// Creates a one-line order and returns its detail.
    pub async fn create_order(
        &self,
        supplier_id: i64,
        cost_center_id: i64,
        currency: &str,
        order_date: &str,
        unit_price: f64,
    ) -> Value {
        self.send_ok(
            Method::POST,
            "/api/orders",
            Some(json!({
                "supplier_id": supplier_id,
                "cost_center_id": cost_center_id,
                "currency": currency,
                "order_date": order_date,
                "items": [{
                    "product_name": "Servicio de soporte",
                    "quantity": 1,
                    "unit_price": unit_price
                }]
            })),
        )
        .await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

/// Reads a decimal that may be serialized as a string or a number.
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    use std::str::FromStr;
    match value {
        Value::String(s) => rust_decimal::Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => rust_decimal::Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {}", other),
    }
}

/// `YYYY-MM-DD` of the 10th of the current month.
pub fn this_month_date() -> String {
    format!("{}-10", this_month())
}

pub fn this_month() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}
