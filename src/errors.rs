use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr};
use serde::{Deserialize, Serialize};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// One rejected row of a batch operation (import, bulk update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Zero-based position of the row in the submitted batch
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// Failure body shared by every JSON route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Human-readable error description
    pub error: String,
    /// Machine-readable error kind
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<RowError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{message}")]
    BatchRejected {
        message: String,
        errors: Vec<RowError>,
    },

    #[error("Document rendering failed: {0}")]
    RenderError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    /// True when the database rejected a write on a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseError(e) => is_unique_violation(e),
            _ => false,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            Self::DatabaseError(DbErr::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::BatchRejected { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RenderError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(e) if is_unique_violation(e) => "conflict",
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::BatchRejected { .. } => "batch_rejected",
            Self::RenderError(_) => "render_error",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(e) if is_unique_violation(e) => {
                "A record with the same unique key already exists".to_string()
            }
            // internal tool: database detail is passed through
            _ => self.to_string(),
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let details = match &self {
            Self::BatchRejected { errors, .. } => Some(errors.clone()),
            _ => None,
        };

        let err = ErrorResponse {
            success: false,
            error: self.response_message(),
            code: self.code().to_string(),
            details,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::RenderError("browser exited".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::BatchRejected {
                message: "rejected".into(),
                errors: vec![]
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn database_message_is_passed_through() {
        let err = ServiceError::DatabaseError(DbErr::Custom("no such table: budgets".into()));
        assert!(err.response_message().contains("no such table: budgets"));
        assert_eq!(err.code(), "database_error");
    }

    #[tokio::test]
    async fn error_body_carries_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("Order 9 not found".into()).into_response()
            })
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error, "Order 9 not found");
        assert_eq!(parsed.code, "not_found");
        assert_eq!(parsed.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn batch_rejection_lists_row_errors() {
        let response = ServiceError::BatchRejected {
            message: "2 rows rejected".into(),
            errors: vec![RowError::new(0, "bad month"), RowError::new(3, "bad amount")],
        }
        .into_response();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        let details = parsed.details.expect("details expected");
        assert_eq!(details.len(), 2);
        assert_eq!(details[1].row, 3);
    }
}
