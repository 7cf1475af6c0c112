//! Integration tests for operator authentication.
//!
//! Tests cover:
//! - Rejection of requests without or with a bad token
//! - Login with wrong credentials
//! - Token verification
//! - Logout revoking the token

mod common;

use axum::http::Method;
use common::{response_json, TestApp, OPERATOR, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/orders", None, None).await;

    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/suppliers", None, Some("invalid_token_here"))
        .await;

    assert_eq!(response.status(), 401, "Invalid token should be rejected");
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": OPERATOR, "password": "not-the-password" })),
            None,
        )
        .await;
    assert_eq!(response.status(), 401);

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "someone", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_empty_credentials_are_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "", "password": "" })),
            None,
        )
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_verify_returns_operator() {
    let app = TestApp::new().await;

    let data = app.send_ok(Method::GET, "/api/auth/verify", None).await;

    assert_eq!(data["valid"], true);
    assert_eq!(data["user"]["username"], OPERATOR);
    assert_eq!(data["user"]["role"], "admin");
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = TestApp::new().await;
    let token = app.login(OPERATOR, PASSWORD).await;

    let response = app
        .request(Method::POST, "/api/auth/logout", None, Some(&token))
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request(Method::GET, "/api/auth/verify", None, Some(&token))
        .await;
    assert_eq!(response.status(), 401, "Revoked token should be rejected");

    // Other sessions stay valid
    let response = app
        .request_authenticated(Method::GET, "/api/auth/verify", None)
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_public_routes_need_no_token() {
    let app = TestApp::new().await;

    for uri in ["/health/live", "/login", "/"] {
        let response = app.request(Method::GET, uri, None, None).await;
        assert_eq!(response.status(), 200, "{} should be public", uri);
    }
}
