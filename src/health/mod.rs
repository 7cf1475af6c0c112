/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - pings the database
 * - Liveness check (`/health/live`) - process is up
 * - Version (`/health/version`)
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub pdf_browser_path: String,
    pub started: Instant,
}

impl HealthState {
    pub fn new(db: Arc<DatabaseConnection>, pdf_browser_path: impl Into<String>) -> Self {
        Self {
            db,
            pdf_browser_path: pdf_browser_path.into(),
            started: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthInfo {
        let mut details = BTreeMap::new();

        let database = match crate::db::check_connection(&self.db).await {
            Ok(()) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
            },
            Err(e) => {
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some(e.to_string()),
                }
            }
        };
        details.insert("database".to_string(), database);

        // bare names are resolved through PATH at render time
        let browser = Path::new(&self.pdf_browser_path);
        let browser_known = !self.pdf_browser_path.contains('/') || browser.exists();
        details.insert(
            "pdf_renderer".to_string(),
            if browser_known {
                HealthDetail {
                    status: HealthStatus::Up,
                    message: None,
                }
            } else {
                HealthDetail {
                    status: HealthStatus::Degraded,
                    message: Some(format!("{} not found", self.pdf_browser_path)),
                }
            },
        );

        let status = if details.values().any(|d| d.status == HealthStatus::Down) {
            HealthStatus::Down
        } else if details.values().any(|d| d.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };

        HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            details,
        }
    }
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.check().await;
    debug!(status = ?health.status, "Health check");

    let status_code = match health.status {
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "uptime_seconds": state.started.elapsed().as_secs(),
        "timestamp": Utc::now(),
    }))
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_database_and_renderer() {
        let db = Arc::new(crate::db::test_pool().await);
        let state = HealthState::new(db, "/nonexistent/chromium");
        let info = state.check().await;
        assert_eq!(info.details["database"].status, HealthStatus::Up);
        assert_eq!(info.details["pdf_renderer"].status, HealthStatus::Degraded);
        assert_eq!(info.status, HealthStatus::Degraded);

        let state = HealthState::new(state.db.clone(), "chromium");
        assert_eq!(state.check().await.status, HealthStatus::Up);
    }
}
