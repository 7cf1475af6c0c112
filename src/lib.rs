//! BuyTrack API Library
//!
//! Purchase orders, suppliers, cost centers and monthly budgets behind a
//! JSON API, plus the page shells and static assets of the web client.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod listing;
pub mod metrics;
pub mod migrator;
pub mod money;
pub mod period;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, middleware, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
};

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    handlers::AppServices,
    health::HealthState,
    services::documents::{ChromiumRenderer, PdfRenderer},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub services: AppServices,
}

impl AppState {
    /// Wires every service over one database handle.
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, renderer: Arc<dyn PdfRenderer>) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from_app_config(&config)));
        let services = AppServices::new(db.clone(), &config, renderer);
        Self {
            db,
            config: Arc::new(config),
            auth,
            services,
        }
    }

    /// State with the headless Chromium renderer from configuration.
    pub fn with_chromium(db: Arc<DatabaseConnection>, config: AppConfig) -> Self {
        let renderer = Arc::new(ChromiumRenderer::new(
            config.pdf_browser_path.clone(),
            config.pdf_max_concurrent_renders,
            Duration::from_secs(config.pdf_render_timeout_secs),
        ));
        Self::new(db, config, renderer)
    }
}

/// Success envelope shared by every JSON route
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: ResponseMeta::capture(),
        }
    }
}

/// `/api` routes; everything but login needs a bearer token.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/dashboard", handlers::dashboard::dashboard_routes())
        .nest("/suppliers", handlers::suppliers::supplier_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/cost-centers", handlers::cost_centers::cost_center_routes())
        .nest("/budgets", handlers::budgets::budget_routes())
        .nest("/pdf", handlers::pdf::pdf_routes())
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .nest("/auth", handlers::auth::public_auth_routes())
        .merge(protected)
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router: API, health, metrics, pages and static assets.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let health = Arc::new(HealthState::new(
        state.db.clone(),
        config.pdf_browser_path.clone(),
    ));

    Router::new()
        .nest("/api", api_routes(&state))
        .with_state(state)
        .nest("/health", health::health_routes(health))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(handlers::pages::page_routes())
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config))
        .layer(middleware::from_fn(metrics::http_metrics_middleware))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(middleware::from_fn(crate::tracing::request_id_middleware))
}
