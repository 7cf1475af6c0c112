use crate::{errors::ServiceError, ApiResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Body returned by delete endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub id: i32,
    pub deleted: bool,
}

pub fn deleted_response(id: i32) -> Response {
    success_response(Deleted { id, deleted: true })
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Splits a comma separated query value, dropping blanks.
pub fn split_csv_param(raw: Option<&str>) -> Vec<&str> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_param_drops_blanks() {
        assert_eq!(
            split_csv_param(Some("2025-01, ,2025-02,")),
            vec!["2025-01", "2025-02"]
        );
        assert!(split_csv_param(None).is_empty());
    }
}
