use super::common::{success_response, validate_input};
use crate::{
    auth::{AuthUser, LoginCredentials},
    errors::ServiceError,
    AppState,
};
use axum::{
    extract::{Json, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::info;

/// Login handler
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    Ok(success_response(state.auth.login(&payload)?))
}

/// Returns the user behind the bearer token
async fn verify(user: AuthUser) -> Response {
    success_response(json!({ "valid": true, "user": user }))
}

/// Revokes the bearer token
async fn logout(State(state): State<AppState>, user: AuthUser) -> Response {
    state.auth.revoke(&user);
    info!(username = %user.username, "Operator logged out");
    success_response(json!({ "logged_out": true }))
}

/// Routes reachable without a token
pub fn public_auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", get(verify))
        .route("/logout", post(logout))
}
